use std::fmt::Debug;

use async_trait::async_trait;

use crate::{
    Bitfield, ChainResult, Commitment, MmrLeaf, MmrProof, Ticket, TxOutcome, ValidatorProof,
    ValidatorSet, H160, H256, U256,
};

/// A point-in-time read of the client state the engine mirrors, taken on
/// startup and whenever a gap in the event stream forces a reconcile.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    /// Latest beefy block the contract has accepted.
    pub latest_beefy_block: u64,
    /// The validator set currently signing commitments.
    pub current_validator_set: ValidatorSet,
    /// The validator set taking over at the next handoff.
    pub next_validator_set: ValidatorSet,
    /// The relayer roster, in turn order.
    pub relayers: Vec<H160>,
    /// Whose turn it is to submit.
    pub current_turn_index: u64,
}

/// Interface of the on-chain BEEFY light client, as seen by the engine.
///
/// Implementations own the RPC transport, ABI encoding and transaction
/// signing; the engine only decides what to send and when. All waits are
/// expected to be bounded by the caller via timeouts.
#[async_trait]
pub trait BeefyClient: Send + Sync + Debug {
    /// Address of the contract currently being driven. Injectable
    /// configuration: the proxy implementation behind it can change.
    fn address(&self) -> H160;

    /// Current execution-chain block height.
    async fn block_number(&self) -> ChainResult<u64>;

    /// Latest beefy block the client has accepted.
    async fn latest_beefy_block(&self) -> ChainResult<u64>;

    /// The currently signing validator set.
    async fn current_validator_set(&self) -> ChainResult<ValidatorSet>;

    /// The next validator set.
    async fn next_validator_set(&self) -> ChainResult<ValidatorSet>;

    /// Index into the roster of the relayer whose turn it is.
    async fn current_turn_index(&self) -> ChainResult<u64>;

    /// The relayer roster, in turn order.
    async fn relayers(&self) -> ChainResult<Vec<H160>>;

    /// Whether the post-submission grace period is currently active.
    async fn is_grace_period_active(&self) -> ChainResult<bool>;

    /// Gas credited so far against a commitment hash.
    async fn credited_gas(&self, commitment_hash: H256) -> ChainResult<U256>;

    /// Tip accumulated for a beefy block.
    async fn tips(&self, beefy_block: u64) -> ChainResult<U256>;

    /// The live ticket for a commitment hash, if any.
    async fn active_ticket(&self, commitment_hash: H256) -> ChainResult<Option<Ticket>>;

    /// Validator indices whose initial claims the contract has recorded as
    /// confirmed after the challenge window.
    async fn confirmed_signers(&self, commitment_hash: H256) -> ChainResult<Vec<u32>>;

    /// Open a submission: claim the bitfield and prove one signature.
    async fn submit_initial(
        &self,
        commitment: &Commitment,
        bitfield: &Bitfield,
        proof: &ValidatorProof,
    ) -> ChainResult<TxOutcome>;

    /// Commit the prev-randao value for the pending submission.
    async fn commit_prev_randao(&self, commitment_hash: H256) -> ChainResult<TxOutcome>;

    /// Complete a submission with the confirmed signer proofs, the MMR
    /// leaf, and any tip blocks to claim alongside.
    #[allow(clippy::too_many_arguments)]
    async fn submit_final(
        &self,
        commitment: &Commitment,
        bitfield: &Bitfield,
        proofs: &[ValidatorProof],
        leaf: &MmrLeaf,
        leaf_proof: &MmrProof,
        claim_tip_blocks: &[u64],
    ) -> ChainResult<TxOutcome>;

    /// Abandon the relayer's pending submission.
    async fn clear_ticket(&self) -> ChainResult<TxOutcome>;

    /// Attach a tip to a beefy block.
    async fn add_tip(&self, beefy_block: u64, amount: U256) -> ChainResult<TxOutcome>;

    /// Read the full mirrored state in one pass.
    async fn state(&self) -> ChainResult<ClientState> {
        Ok(ClientState {
            latest_beefy_block: self.latest_beefy_block().await?,
            current_validator_set: self.current_validator_set().await?,
            next_validator_set: self.next_validator_set().await?,
            relayers: self.relayers().await?,
            current_turn_index: self.current_turn_index().await?,
        })
    }
}

#[cfg(feature = "test-utils")]
mod mock {
    #![allow(missing_docs, non_snake_case)]

    use async_trait::async_trait;
    use mockall::mock;

    use super::*;

    mock! {
        /// Scripted stand-in for the on-chain client, for engine tests.
        pub BeefyClientContract {}

        #[async_trait]
        impl BeefyClient for BeefyClientContract {
            fn address(&self) -> H160;
            async fn block_number(&self) -> ChainResult<u64>;
            async fn latest_beefy_block(&self) -> ChainResult<u64>;
            async fn current_validator_set(&self) -> ChainResult<ValidatorSet>;
            async fn next_validator_set(&self) -> ChainResult<ValidatorSet>;
            async fn current_turn_index(&self) -> ChainResult<u64>;
            async fn relayers(&self) -> ChainResult<Vec<H160>>;
            async fn is_grace_period_active(&self) -> ChainResult<bool>;
            async fn credited_gas(&self, commitment_hash: H256) -> ChainResult<U256>;
            async fn tips(&self, beefy_block: u64) -> ChainResult<U256>;
            async fn active_ticket(&self, commitment_hash: H256) -> ChainResult<Option<Ticket>>;
            async fn confirmed_signers(&self, commitment_hash: H256) -> ChainResult<Vec<u32>>;
            async fn submit_initial(
                &self,
                commitment: &Commitment,
                bitfield: &Bitfield,
                proof: &ValidatorProof,
            ) -> ChainResult<TxOutcome>;
            async fn commit_prev_randao(&self, commitment_hash: H256) -> ChainResult<TxOutcome>;
            async fn submit_final(
                &self,
                commitment: &Commitment,
                bitfield: &Bitfield,
                proofs: &[ValidatorProof],
                leaf: &MmrLeaf,
                leaf_proof: &MmrProof,
                claim_tip_blocks: &[u64],
            ) -> ChainResult<TxOutcome>;
            async fn clear_ticket(&self) -> ChainResult<TxOutcome>;
            async fn add_tip(&self, beefy_block: u64, amount: U256) -> ChainResult<TxOutcome>;
        }
    }

    impl std::fmt::Debug for MockBeefyClientContract {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "MockBeefyClientContract")
        }
    }
}

#[cfg(feature = "test-utils")]
pub use mock::MockBeefyClientContract;
