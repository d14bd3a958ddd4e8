use crate::{H160, H256, U256};

/// Events emitted by the light client that the engine folds into its
/// local mirror of contract state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeefyEvent {
    /// A relayer joined the roster.
    RelayerAdded {
        /// The new roster member.
        relayer: H160,
    },
    /// A relayer left the roster.
    RelayerRemoved {
        /// The removed roster member.
        relayer: H160,
    },
    /// The submission turn rotated.
    TurnAdvanced {
        /// The new turn index.
        index: u64,
    },
    /// Gas was credited to a relayer for work on a commitment.
    GasCredited {
        /// The credited relayer.
        relayer: H160,
        /// The commitment the work was for.
        commitment_hash: H256,
        /// Gas units consumed.
        gas_used: U256,
        /// Gas price the credit was computed at.
        gas_price: U256,
    },
    /// A tip was attached to a beefy block.
    TipAdded {
        /// The tipped beefy block.
        beefy_block: u64,
        /// Tip amount in wei.
        amount: U256,
    },
    /// A relayer withdrew its accumulated tips.
    TipsClaimed {
        /// The claiming relayer.
        relayer: H160,
        /// Amount withdrawn.
        amount: U256,
    },
    /// A submission was refunded to its relayer.
    SubmissionRefunded {
        /// The refunded relayer.
        relayer: H160,
        /// Refund amount in wei.
        amount: U256,
    },
    /// The proxy switched to a new implementation. Automated submission
    /// must pause until an operator confirms ABI compatibility.
    Upgraded {
        /// The new implementation address.
        implementation: H160,
    },
}

/// One event occurrence as delivered by the event source. Delivery is
/// at-least-once, so consumers de-duplicate by [`EventEnvelope::dedup_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Index of the log within the block.
    pub log_index: u64,
    /// The decoded event.
    pub event: BeefyEvent,
}

impl EventEnvelope {
    /// Unique identity of this occurrence across redeliveries.
    pub fn dedup_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}
