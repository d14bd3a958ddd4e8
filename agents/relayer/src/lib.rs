//! The BEEFY relayer agent.
//!
//! Decides when this relayer is entitled and obligated to submit BEEFY
//! consensus commitments to the on-chain light client, builds the bitfield
//! and validator-proof payloads, and mirrors the contract's turn, ticket,
//! gas-credit and tip state from its event stream.
//!
//! Chain transport, event subscription and signing are injected by the
//! embedding binary through [`RelayerClients`]; run the agent with
//! `beefy_base::agent_main::<BeefyRelayer>(clients)`.

#![forbid(unsafe_code)]

pub mod gas;
pub mod msg;
pub mod processor;
pub mod settings;
pub mod sync;
pub mod ticket;
pub mod turn;
pub mod validator_set;

mod relayer;

pub use relayer::{BeefyRelayer, RelayerClients};
