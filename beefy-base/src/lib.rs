//! A small framework for building BEEFY relay agents: settings loading,
//! tracing setup, prometheus metrics, and the agent run loop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Settings and configuration loading.
pub mod settings;

mod agent;
pub use agent::*;

mod metrics;
pub use metrics::*;
