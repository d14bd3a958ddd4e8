use crate::H256;

/// The result of interacting with the chain.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// Errors returned when calling the chain or dispatching a transaction.
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// Transport-level failure; the caller may retry with backoff.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),
    /// The transaction was rejected on chain with the given reason.
    #[error("transaction reverted: {0}")]
    Reverted(String),
    /// A transaction was dropped from the mempool.
    #[error("transaction dropped from mempool {0:?}")]
    TransactionDropped(H256),
    /// A transaction submission or receipt wait timed out. The outcome is
    /// unresolved; callers must re-verify state before acting again.
    #[error("transaction submission timed out")]
    TransactionTimeout,
}

/// Revert selectors that signal another relayer won the submission race.
/// These are a normal consequence of permissionless submission and abort the
/// lifecycle cleanly instead of surfacing as failures.
const COMPETITION_SELECTORS: &[&str] = &[
    // TicketAlreadyOwned()
    "0x60bbe44e",
    // StaleCommitment()
    "0x3d618e50",
    // NotTicketOwner()
    "0xe18d39ad",
    // InvalidCommitment()
    "0xc06789fa",
];

impl ChainCommunicationError {
    /// True if this error is a revert that merely reports losing a
    /// submission race to a competing relayer.
    pub fn is_competition_loss(&self) -> bool {
        match self {
            ChainCommunicationError::Reverted(reason) => COMPETITION_SELECTORS
                .iter()
                .any(|selector| reason.contains(selector)),
            _ => false,
        }
    }
}

/// The result of a lifecycle or bookkeeping operation in the engine.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors raised by the submission engine itself. These are logic errors:
/// fatal to the lifecycle instance that hit them, never to the process.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// An operation was attempted in a state that does not permit it.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// A validator index does not fit the validator set it was used with.
    #[error("validator index {index} out of range for set of length {length}")]
    IndexOutOfRange {
        /// The offending index.
        index: u32,
        /// The length of the validator set.
        length: u32,
    },
    /// The final bitfield intersection came up empty: no quorum survives.
    #[error("no confirmed signer survives the initial claim for {commitment_hash:?}")]
    EmptyFinalSet {
        /// Hash of the commitment whose final bitfield was empty.
        commitment_hash: H256,
    },
    /// The relayer already holds a live ticket.
    #[error("relayer already holds an active ticket for {0:?}")]
    TicketAlreadyActive(H256),
    /// A claim was issued against a zero balance.
    #[error("nothing to claim")]
    NothingToClaim,
    /// The local mirror disagrees with freshly read authoritative state.
    /// Forces a resync; never silently proceeded past.
    #[error("local state is stale: {0}")]
    StaleState(String),
    /// A chain interaction failed underneath an engine operation.
    #[error(transparent)]
    Chain(#[from] ChainCommunicationError),
}
