pub use beefy_client::*;
pub use event_source::*;
pub use identity::*;

mod beefy_client;
mod event_source;
mod identity;

/// The result of a transaction.
#[derive(Debug, Clone, Copy)]
pub struct TxOutcome {
    /// The txid.
    pub txid: crate::H256,
    /// True if executed, false otherwise (reverted, etc.).
    pub executed: bool,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Amount of gas used on this transaction.
    pub gas_used: crate::U256,
    /// Price paid for the gas.
    pub gas_price: crate::U256,
}
