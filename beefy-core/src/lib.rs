//! Core data model and collaborator contracts for the BEEFY relayer.
//!
//! This crate is I/O free: it defines the types exchanged between the
//! submission engine and the chain, the canonical commitment encoding, and
//! the traits behind which the actual RPC client, event transport and
//! signing identity live.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub use error::*;
pub use traits::*;
pub use types::*;

mod error;
mod traits;
mod types;

pub mod merkle;
pub mod utils;
