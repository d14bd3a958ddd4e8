use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use eyre::eyre;
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use beefy_core::{
    merkle, BeefyClient, Bitfield, ChainCommunicationError, ChainResult, Commitment,
    CommitmentTask, RelayError, RelayResult, RelayerIdentity, ValidatorProof, H256,
};

use crate::gas::GasAccountant;
use crate::settings::SubmissionPolicy;
use crate::ticket::TicketManager;
use crate::turn::TurnState;
use crate::validator_set::{SetSlot, ValidatorSetTracker};

use super::bitfield_builder;
use super::pending_operation::{
    PendingOperation, PrepareResult, SubmitResult, ValidationResult,
};

/// Roughly one execution-chain slot; used when waiting on chain progress.
const BLOCK_TIME: Duration = Duration::from_secs(12);

/// Retriable failures are retried with backoff this many times, then the
/// lifecycle is surfaced and discarded. The counter resets whenever a
/// transaction goes through.
const MAX_RETRIES: u32 = 16;

/// Shared wiring every submission lifecycle runs against. One instance
/// per agent; lifecycles for distinct commitments share the read-mostly
/// mirrors and the append-only gas ledger.
#[derive(Debug)]
pub struct SubmissionContext {
    /// The on-chain light client.
    pub client: Arc<dyn BeefyClient>,
    /// Our own relayer identity.
    pub identity: Arc<dyn RelayerIdentity>,
    /// Mirror of the current/next validator sets.
    pub validator_sets: Arc<ValidatorSetTracker>,
    /// Local single-flight tickets.
    pub tickets: Arc<TicketManager>,
    /// Gas credit and tip ledger.
    pub gas: Arc<GasAccountant>,
    /// Mirror of the relayer roster and turn index.
    pub turn: Arc<RwLock<TurnState>>,
    /// Set when an implementation upgrade was observed; blocks new
    /// lifecycles until operator confirmation.
    pub paused: Arc<AtomicBool>,
    /// Mirror of the latest beefy block the client has accepted.
    pub latest_beefy_block: Arc<AtomicU64>,
    /// Beefy block of our last accepted submission.
    pub last_submitted_block: Arc<AtomicU64>,
    /// Policy knobs from settings.
    pub policy: SubmissionPolicy,
}

impl SubmissionContext {
    fn our_address(&self) -> beefy_core::H160 {
        self.identity.address()
    }
}

/// Lifecycle stage of one commitment submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SubmissionState {
    /// Nothing in flight for this commitment.
    Idle,
    /// The initial claim landed; waiting out the randao commit delay.
    InitialSubmitted,
    /// Prev-randao committed; waiting for confirmed signers.
    RandaoCommitted,
    /// Final bitfield and proofs assembled, ready to send.
    FinalReady,
    /// The client accepted the final submission.
    Finalized,
}

/// One commitment's submission lifecycle, driven by the serial submitter.
///
/// Idle -> InitialSubmitted -> RandaoCommitted -> FinalReady -> Finalized,
/// with any stage falling back to Idle (ticket cleared, nothing credited)
/// on rejection, supersession or an expired confirmation window. Progress
/// is only ever made on observed chain state, never on timers.
pub struct PendingSubmission {
    task: CommitmentTask,
    commitment_hash: H256,
    ctx: Arc<SubmissionContext>,
    state: SubmissionState,
    initial_bitfield: Option<Bitfield>,
    final_bitfield: Option<Bitfield>,
    proofs: Vec<ValidatorProof>,
    claimed_tip_blocks: Vec<u64>,
    /// Execution block the initial submission landed in.
    initial_submitted_at: Option<u64>,
    confirm_deadline: Option<Instant>,
    num_retries: u32,
    next_attempt_after: Option<Instant>,
}

impl Debug for PendingSubmission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // intentionally leaves out ctx
        write!(
            f,
            "PendingSubmission {{ commitment_hash: {:?}, block: {}, state: {}, num_retries: {} }}",
            self.commitment_hash,
            self.commitment().block_number,
            self.state,
            self.num_retries
        )
    }
}

impl PendingSubmission {
    /// Start an idle lifecycle for a commitment task.
    pub fn new(task: CommitmentTask, ctx: Arc<SubmissionContext>) -> Self {
        let commitment_hash = task.commitment_hash();
        Self {
            task,
            commitment_hash,
            ctx,
            state: SubmissionState::Idle,
            initial_bitfield: None,
            final_bitfield: None,
            proofs: vec![],
            claimed_tip_blocks: vec![],
            initial_submitted_at: None,
            confirm_deadline: None,
            num_retries: 0,
            next_attempt_after: None,
        }
    }

    /// The current lifecycle stage.
    pub fn state(&self) -> SubmissionState {
        self.state
    }

    fn commitment(&self) -> &Commitment {
        &self.task.signed_commitment.commitment
    }

    fn backoff(num_retries: u32) -> Duration {
        Duration::from_secs(match num_retries {
            0 => 0,
            1..=3 => 5,
            4..=7 => 30,
            _ => 120,
        })
    }

    /// Bound a chain interaction by the policy timeout. Expiry is treated
    /// as unresolved, never as failure or success.
    async fn bounded<T, F>(&self, fut: F) -> ChainResult<T>
    where
        F: Future<Output = ChainResult<T>>,
    {
        match tokio::time::timeout(self.ctx.policy.tx_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ChainCommunicationError::TransactionTimeout),
        }
    }

    fn retries_exhausted(&mut self) -> bool {
        self.num_retries += 1;
        if self.num_retries > MAX_RETRIES {
            error!(
                commitment_hash = ?self.commitment_hash,
                state = %self.state,
                retries = self.num_retries,
                "Retries exhausted, discarding lifecycle"
            );
            self.reset_to_idle("retries exhausted");
            return true;
        }
        self.next_attempt_after = Some(Instant::now() + Self::backoff(self.num_retries));
        false
    }

    fn on_reprepare(&mut self) -> PrepareResult {
        if self.retries_exhausted() {
            PrepareResult::Drop
        } else {
            PrepareResult::Retry
        }
    }

    fn on_resubmit(&mut self) -> SubmitResult {
        if self.retries_exhausted() {
            SubmitResult::Drop
        } else {
            SubmitResult::Retry
        }
    }

    fn not_ready_for(&mut self, wait: Duration) -> PrepareResult {
        self.next_attempt_after = Some(Instant::now() + wait);
        PrepareResult::NotReady
    }

    /// Fall back to Idle: release the local ticket and forget any
    /// assembled payload. Nothing gets credited for the abandoned work.
    fn reset_to_idle(&mut self, reason: &str) {
        warn!(
            commitment_hash = ?self.commitment_hash,
            state = %self.state,
            reason,
            "Falling back to idle"
        );
        self.ctx.tickets.clear(self.ctx.our_address());
        self.state = SubmissionState::Idle;
        self.initial_bitfield = None;
        self.final_bitfield = None;
        self.proofs.clear();
        self.claimed_tip_blocks.clear();
        self.initial_submitted_at = None;
        self.confirm_deadline = None;
    }

    /// Abandon a lifecycle that holds the on-chain ticket: best-effort
    /// clear on chain, then fall back locally.
    async fn abandon(&mut self, reason: &str) {
        if let Err(err) = self.bounded(self.ctx.client.clear_ticket()).await {
            warn!(
                commitment_hash = ?self.commitment_hash,
                error = %err,
                "Failed to clear on-chain ticket"
            );
        }
        self.reset_to_idle(reason);
    }

    fn validator_proof(&self, index: u32) -> RelayResult<ValidatorProof> {
        let signature = self
            .task
            .signed_commitment
            .signatures
            .get(index as usize)
            .copied()
            .flatten()
            .ok_or(RelayError::InvalidState("claimed validator did not sign"))?;
        let account = *self
            .task
            .validators
            .get(index as usize)
            .ok_or(RelayError::IndexOutOfRange {
                index,
                length: self.task.validators.len() as u32,
            })?;
        let leaves: Vec<Vec<u8>> = self
            .task
            .validators
            .iter()
            .map(|address| address.as_bytes().to_vec())
            .collect();
        let merkle_proof = merkle::merkle_proof(&leaves, index as usize)?;
        Ok(ValidatorProof {
            signature,
            index: index as u64,
            account,
            merkle_proof,
        })
    }

    fn ensure_initial_bitfield(&mut self) -> RelayResult<Bitfield> {
        if let Some(bitfield) = &self.initial_bitfield {
            return Ok(bitfield.clone());
        }
        let set = self
            .ctx
            .validator_sets
            .set_for(self.commitment().validator_set_id)?;
        let candidates = self.task.signed_commitment.signed_indices();
        let bitfield = bitfield_builder::build_initial(&candidates, set.length)?;
        self.initial_bitfield = Some(bitfield.clone());
        Ok(bitfield)
    }

    async fn prepare_initial(&mut self) -> PrepareResult {
        let me = self.ctx.our_address();

        if self.ctx.paused.load(AtomicOrdering::Relaxed) && !self.ctx.policy.resume_after_upgrade {
            error!(
                commitment_hash = ?self.commitment_hash,
                state = %self.state,
                "Implementation upgraded; submission paused pending operator confirmation"
            );
            return PrepareResult::Drop;
        }

        let block_number = self.commitment().block_number as u64;
        if self.ctx.latest_beefy_block.load(AtomicOrdering::Relaxed) >= block_number {
            debug!(
                commitment_hash = ?self.commitment_hash,
                block_number,
                "Commitment already finalized on chain, dropping"
            );
            return PrepareResult::Drop;
        }

        // Eligibility: our turn, or the grace period is over and the
        // commitment moved far enough past the last submission.
        let our_turn = self.ctx.turn.read().current_relayer() == Some(me);
        if !our_turn {
            let grace_active = match self.bounded(self.ctx.client.is_grace_period_active()).await {
                Ok(active) => active,
                Err(err) => {
                    warn!(commitment_hash = ?self.commitment_hash, error = %err, "Could not read grace period");
                    return self.on_reprepare();
                }
            };
            if grace_active {
                debug!(commitment_hash = ?self.commitment_hash, "Not our turn and grace period active");
                return self.not_ready_for(BLOCK_TIME);
            }
            let last = self.ctx.last_submitted_block.load(AtomicOrdering::Relaxed);
            if block_number < last + self.ctx.policy.min_block_increment as u64 {
                debug!(
                    commitment_hash = ?self.commitment_hash,
                    block_number,
                    last_submitted = last,
                    "Below minimum block increment for an out-of-turn submission"
                );
                return self.not_ready_for(BLOCK_TIME);
            }
        }

        // Re-read the authoritative in-flight state immediately before
        // committing to a send; someone may have beaten us to it.
        match self.bounded(self.ctx.client.active_ticket(self.commitment_hash)).await {
            Ok(Some(ticket)) if ticket.owner != me => {
                info!(
                    commitment_hash = ?self.commitment_hash,
                    owner = ?ticket.owner,
                    "Another relayer already claimed this commitment"
                );
                self.ctx.tickets.clear(me);
                return PrepareResult::Drop;
            }
            Ok(Some(_)) => {
                // Our earlier submission landed after all (e.g. a timed
                // out send); resume the lifecycle from there.
                debug!(commitment_hash = ?self.commitment_hash, "Found our ticket on chain, resuming");
                self.state = SubmissionState::InitialSubmitted;
                return self.not_ready_for(Duration::ZERO);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(commitment_hash = ?self.commitment_hash, error = %err, "Could not read active ticket");
                return self.on_reprepare();
            }
        }

        if let Err(err) = self.ctx.tickets.acquire(me, self.commitment_hash) {
            match err {
                RelayError::TicketAlreadyActive(held) if held == self.commitment_hash => {
                    // re-preparing the same lifecycle after a retry
                }
                RelayError::TicketAlreadyActive(held) => {
                    debug!(
                        commitment_hash = ?self.commitment_hash,
                        held = ?held,
                        "Holding a ticket for another commitment; deferring"
                    );
                    return self.not_ready_for(BLOCK_TIME);
                }
                err => {
                    error!(commitment_hash = ?self.commitment_hash, state = %self.state, error = %err, "Ticket acquisition failed");
                    return PrepareResult::Drop;
                }
            }
        }

        let bitfield = match self.ensure_initial_bitfield() {
            Ok(bitfield) => bitfield,
            Err(RelayError::StaleState(reason)) => {
                // validator set handoff has not caught up with this
                // commitment yet
                debug!(commitment_hash = ?self.commitment_hash, reason, "Waiting for validator set updates");
                self.ctx.tickets.clear(me);
                return self.on_reprepare();
            }
            Err(err) => {
                error!(
                    commitment_hash = ?self.commitment_hash,
                    state = %self.state,
                    error = %err,
                    "Commitment does not fit the tracked validator set"
                );
                self.ctx.tickets.clear(me);
                return PrepareResult::Drop;
            }
        };

        let candidates = bitfield.set_indices();
        let Some(&claimant) = candidates.first() else {
            error!(commitment_hash = ?self.commitment_hash, state = %self.state, "Commitment carries no signatures");
            self.ctx.tickets.clear(me);
            return PrepareResult::Drop;
        };
        match self.validator_proof(claimant) {
            Ok(proof) => self.proofs = vec![proof],
            Err(err) => {
                error!(commitment_hash = ?self.commitment_hash, state = %self.state, error = %err, "Could not build claimant proof");
                self.ctx.tickets.clear(me);
                return PrepareResult::Drop;
            }
        }
        PrepareResult::Ready
    }

    async fn prepare_randao(&mut self) -> PrepareResult {
        let submitted_at = match self.initial_submitted_at {
            Some(block) => block,
            // resumed lifecycle; start the delay from the present
            None => match self.bounded(self.ctx.client.block_number()).await {
                Ok(now) => {
                    self.initial_submitted_at = Some(now);
                    now
                }
                Err(err) => {
                    warn!(commitment_hash = ?self.commitment_hash, error = %err, "Could not read block number");
                    return self.on_reprepare();
                }
            },
        };
        match self.bounded(self.ctx.client.block_number()).await {
            Ok(now) if now >= submitted_at + self.ctx.policy.randao_commit_delay_blocks => {
                PrepareResult::Ready
            }
            Ok(_) => self.not_ready_for(BLOCK_TIME),
            Err(err) => {
                warn!(commitment_hash = ?self.commitment_hash, error = %err, "Could not read block number");
                self.on_reprepare()
            }
        }
    }

    async fn prepare_final(&mut self) -> PrepareResult {
        let confirmed = match self
            .bounded(self.ctx.client.confirmed_signers(self.commitment_hash))
            .await
        {
            Ok(confirmed) => confirmed,
            Err(err) => {
                warn!(commitment_hash = ?self.commitment_hash, error = %err, "Could not read confirmed signers");
                return self.on_reprepare();
            }
        };
        if confirmed.is_empty() {
            // challenge window still open
            return self.not_ready_for(BLOCK_TIME);
        }

        let prior = match self.ensure_initial_bitfield() {
            Ok(bitfield) => bitfield,
            Err(err) => {
                error!(commitment_hash = ?self.commitment_hash, state = %self.state, error = %err, "Lost the initial bitfield context");
                self.abandon("initial bitfield unavailable").await;
                return PrepareResult::Drop;
            }
        };

        let final_bitfield =
            match bitfield_builder::build_final(self.commitment_hash, &prior, &confirmed) {
                Ok(bitfield) => bitfield,
                Err(err) => {
                    error!(
                        commitment_hash = ?self.commitment_hash,
                        state = %self.state,
                        error = %err,
                        "No claimed signer survived the challenge window"
                    );
                    self.abandon("empty final set").await;
                    return PrepareResult::Drop;
                }
            };

        let mut proofs = Vec::with_capacity(final_bitfield.count_set_bits() as usize);
        for index in final_bitfield.set_indices() {
            match self.validator_proof(index) {
                Ok(proof) => proofs.push(proof),
                Err(err) => {
                    error!(
                        commitment_hash = ?self.commitment_hash,
                        state = %self.state,
                        index,
                        error = %err,
                        "Could not build validator proof"
                    );
                    self.abandon("proof construction failed").await;
                    return PrepareResult::Drop;
                }
            }
        }

        self.final_bitfield = Some(final_bitfield);
        self.proofs = proofs;
        self.state = SubmissionState::FinalReady;
        PrepareResult::Ready
    }

    async fn send_initial(&mut self) -> SubmitResult {
        let (Some(bitfield), Some(proof)) = (self.initial_bitfield.clone(), self.proofs.first().cloned())
        else {
            return SubmitResult::CriticalFailure(eyre!(
                "initial payload missing for {:?} in state {}",
                self.commitment_hash,
                self.state
            ));
        };
        let commitment = self.commitment().clone();
        match self
            .bounded(self.ctx.client.submit_initial(&commitment, &bitfield, &proof))
            .await
        {
            Ok(outcome) if outcome.executed => {
                info!(
                    commitment_hash = ?self.commitment_hash,
                    txid = ?outcome.txid,
                    block = outcome.block_number,
                    "Initial submission accepted"
                );
                self.initial_submitted_at = Some(outcome.block_number);
                self.state = SubmissionState::InitialSubmitted;
                self.num_retries = 0;
                SubmitResult::Submitted
            }
            Ok(_) => {
                self.reset_to_idle("initial submission reverted");
                self.on_resubmit()
            }
            Err(err) if err.is_competition_loss() => {
                info!(commitment_hash = ?self.commitment_hash, error = %err, "Lost the submission race");
                self.reset_to_idle("competition loss");
                SubmitResult::Drop
            }
            Err(ChainCommunicationError::TransactionTimeout) => {
                // unresolved: keep the local ticket, re-verify on the next
                // prepare pass which re-reads the on-chain ticket
                warn!(commitment_hash = ?self.commitment_hash, state = %self.state, "Initial submission unresolved after timeout");
                self.on_resubmit()
            }
            Err(err) => {
                warn!(commitment_hash = ?self.commitment_hash, state = %self.state, error = %err, "Initial submission failed");
                self.reset_to_idle("initial submission rejected");
                self.on_resubmit()
            }
        }
    }

    async fn send_randao(&mut self) -> SubmitResult {
        match self
            .bounded(self.ctx.client.commit_prev_randao(self.commitment_hash))
            .await
        {
            Ok(outcome) if outcome.executed => {
                debug!(commitment_hash = ?self.commitment_hash, txid = ?outcome.txid, "Prev-randao committed");
                self.state = SubmissionState::RandaoCommitted;
                self.num_retries = 0;
                SubmitResult::Submitted
            }
            Ok(_) => {
                self.reset_to_idle("randao commit reverted");
                self.on_resubmit()
            }
            Err(err) if err.is_competition_loss() => {
                info!(commitment_hash = ?self.commitment_hash, error = %err, "Lost the submission race");
                self.reset_to_idle("competition loss");
                SubmitResult::Drop
            }
            Err(err) => {
                warn!(commitment_hash = ?self.commitment_hash, state = %self.state, error = %err, "Randao commit failed");
                self.on_resubmit()
            }
        }
    }

    async fn send_final(&mut self) -> SubmitResult {
        let Some(bitfield) = self.final_bitfield.clone() else {
            return SubmitResult::CriticalFailure(eyre!(
                "final payload missing for {:?} in state {}",
                self.commitment_hash,
                self.state
            ));
        };
        let commitment = self.commitment().clone();
        let proofs = self.proofs.clone();
        let leaf = self.task.leaf;
        let leaf_proof = self.task.leaf_proof.clone();
        let claim_tip_blocks = self.ctx.gas.claimable_tip_blocks();
        match self
            .bounded(self.ctx.client.submit_final(
                &commitment,
                &bitfield,
                &proofs,
                &leaf,
                &leaf_proof,
                &claim_tip_blocks,
            ))
            .await
        {
            Ok(outcome) if outcome.executed => {
                info!(
                    commitment_hash = ?self.commitment_hash,
                    txid = ?outcome.txid,
                    signers = proofs.len(),
                    "Final submission sent"
                );
                self.claimed_tip_blocks = claim_tip_blocks;
                self.confirm_deadline = Some(Instant::now() + self.ctx.policy.confirm_timeout);
                self.num_retries = 0;
                SubmitResult::Submitted
            }
            Ok(_) => {
                self.reset_to_idle("final submission reverted");
                self.on_resubmit()
            }
            Err(err) if err.is_competition_loss() => {
                info!(commitment_hash = ?self.commitment_hash, error = %err, "Lost the submission race");
                self.reset_to_idle("competition loss");
                SubmitResult::Drop
            }
            Err(ChainCommunicationError::Reverted(reason)) => {
                warn!(commitment_hash = ?self.commitment_hash, state = %self.state, reason, "Final submission reverted");
                self.reset_to_idle("final submission reverted");
                self.on_resubmit()
            }
            Err(err) => {
                warn!(commitment_hash = ?self.commitment_hash, state = %self.state, error = %err, "Final submission unresolved");
                self.on_resubmit()
            }
        }
    }

    async fn validate_initial(&mut self) -> ValidationResult {
        let me = self.ctx.our_address();
        match self.bounded(self.ctx.client.active_ticket(self.commitment_hash)).await {
            Ok(Some(ticket)) if ticket.owner == me => ValidationResult::Valid,
            Ok(Some(ticket)) => {
                info!(
                    commitment_hash = ?self.commitment_hash,
                    owner = ?ticket.owner,
                    "Initial submission superseded by another relayer"
                );
                self.reset_to_idle("ticket owned by another relayer");
                ValidationResult::Invalid
            }
            Ok(None) => {
                self.reset_to_idle("ticket not found on chain");
                ValidationResult::Invalid
            }
            Err(err) => {
                warn!(commitment_hash = ?self.commitment_hash, error = %err, "Could not verify ticket");
                ValidationResult::Retry
            }
        }
    }

    async fn validate_final(&mut self) -> ValidationResult {
        let block_number = self.commitment().block_number as u64;
        match self.bounded(self.ctx.client.latest_beefy_block()).await {
            Ok(latest) if latest >= block_number => {
                self.finalize(latest).await;
                ValidationResult::Valid
            }
            Ok(latest) => {
                if self
                    .confirm_deadline
                    .map(|deadline| Instant::now() > deadline)
                    .unwrap_or(false)
                {
                    warn!(
                        commitment_hash = ?self.commitment_hash,
                        state = %self.state,
                        latest,
                        "Final submission not reflected within the confirmation window"
                    );
                    self.abandon("confirmation window expired").await;
                    return ValidationResult::Invalid;
                }
                self.next_attempt_after = Some(Instant::now() + BLOCK_TIME);
                ValidationResult::NotReady
            }
            Err(err) => {
                warn!(commitment_hash = ?self.commitment_hash, error = %err, "Could not read latest beefy block");
                ValidationResult::Retry
            }
        }
    }

    async fn finalize(&mut self, latest_observed: u64) {
        let me = self.ctx.our_address();
        let block_number = self.commitment().block_number as u64;

        self.state = SubmissionState::Finalized;
        self.ctx.tickets.clear(me);
        self.ctx
            .latest_beefy_block
            .fetch_max(latest_observed.max(block_number), AtomicOrdering::Relaxed);
        self.ctx
            .last_submitted_block
            .fetch_max(block_number, AtomicOrdering::Relaxed);
        self.ctx.gas.mark_finalized(block_number);
        self.ctx.gas.settle_tips(&self.claimed_tip_blocks);

        // A finalized handoff rotates the sets; refresh the mirror from
        // authoritative reads rather than trusting local ordering.
        if let Ok(current) = self.bounded(self.ctx.client.current_validator_set()).await {
            if let Err(err) = self.ctx.validator_sets.update(current, SetSlot::Current) {
                warn!(error = %err, "Could not refresh current validator set");
            }
        }
        if let Ok(next) = self.bounded(self.ctx.client.next_validator_set()).await {
            if let Err(err) = self.ctx.validator_sets.update(next, SetSlot::Next) {
                warn!(error = %err, "Could not refresh next validator set");
            }
        }

        let credited = self
            .bounded(self.ctx.client.credited_gas(self.commitment_hash))
            .await
            .ok();
        info!(
            commitment_hash = ?self.commitment_hash,
            beefy_block = block_number,
            credited_gas = ?credited,
            "Submission finalized"
        );
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: SubmissionState) {
        self.state = state;
    }
}

#[async_trait]
impl PendingOperation for PendingSubmission {
    fn commitment_hash(&self) -> H256 {
        self.commitment_hash
    }

    fn priority_block(&self) -> u32 {
        self.commitment().block_number
    }

    #[instrument(skip(self), fields(commitment_hash = ?self.commitment_hash, state = %self.state), level = "debug")]
    async fn prepare(&mut self) -> PrepareResult {
        match self.state {
            SubmissionState::Idle => self.prepare_initial().await,
            SubmissionState::InitialSubmitted => self.prepare_randao().await,
            SubmissionState::RandaoCommitted => self.prepare_final().await,
            SubmissionState::FinalReady => PrepareResult::Ready,
            SubmissionState::Finalized => PrepareResult::Drop,
        }
    }

    #[instrument(skip(self), fields(commitment_hash = ?self.commitment_hash, state = %self.state), level = "debug")]
    async fn submit(&mut self) -> SubmitResult {
        match self.state {
            SubmissionState::Idle => self.send_initial().await,
            SubmissionState::InitialSubmitted => self.send_randao().await,
            SubmissionState::FinalReady => self.send_final().await,
            state => SubmitResult::CriticalFailure(eyre!(
                "submit invoked in state {state} for {:?}",
                self.commitment_hash
            )),
        }
    }

    #[instrument(skip(self), fields(commitment_hash = ?self.commitment_hash, state = %self.state), level = "debug")]
    async fn validate(&mut self) -> ValidationResult {
        match self.state {
            SubmissionState::InitialSubmitted => self.validate_initial().await,
            SubmissionState::RandaoCommitted => ValidationResult::Valid,
            SubmissionState::FinalReady => self.validate_final().await,
            SubmissionState::Finalized => ValidationResult::Valid,
            SubmissionState::Idle => ValidationResult::Invalid,
        }
    }

    fn next_attempt_after(&self) -> Option<Instant> {
        self.next_attempt_after
    }

    fn is_finalized(&self) -> bool {
        self.state == SubmissionState::Finalized
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::gas::{GasAccountant, GasCaps};
    use beefy_core::{
        MmrLeaf, MmrProof, MockBeefyClientContract, PayloadItem, Signature, SignedCommitment,
        StaticIdentity, Ticket, TxOutcome, ValidatorSet, H160, U256, MMR_ROOT_PAYLOAD_ID,
    };

    fn me() -> H160 {
        H160::repeat_byte(0xaa)
    }

    fn other() -> H160 {
        H160::repeat_byte(0xbb)
    }

    fn task() -> CommitmentTask {
        let sig = Signature::from_beefy_bytes([7u8; 65]);
        CommitmentTask {
            signed_commitment: SignedCommitment {
                commitment: Commitment {
                    block_number: 42,
                    validator_set_id: 5,
                    payload: vec![PayloadItem {
                        id: MMR_ROOT_PAYLOAD_ID,
                        data: vec![0x11; 32],
                    }],
                },
                // validators 0 and 2 signed
                signatures: vec![Some(sig), None, Some(sig)],
            },
            validators: vec![
                H160::repeat_byte(1),
                H160::repeat_byte(2),
                H160::repeat_byte(3),
            ],
            leaf: MmrLeaf::default(),
            leaf_proof: MmrProof::default(),
        }
    }

    fn policy() -> SubmissionPolicy {
        SubmissionPolicy {
            max_gas_price: U256::from(40u64),
            max_refund_amount: U256::from(3_000_000u64),
            min_block_increment: 10,
            randao_commit_delay_blocks: 2,
            pacing: Duration::ZERO,
            tx_timeout: Duration::from_secs(1),
            confirm_timeout: Duration::from_secs(600),
            resume_after_upgrade: false,
        }
    }

    fn ctx_with(client: MockBeefyClientContract, our_turn: bool) -> Arc<SubmissionContext> {
        let policy = policy();
        Arc::new(SubmissionContext {
            client: Arc::new(client),
            identity: Arc::new(StaticIdentity(me())),
            validator_sets: Arc::new(ValidatorSetTracker::new(
                ValidatorSet {
                    id: 5,
                    length: 3,
                    root: H256::repeat_byte(5),
                },
                ValidatorSet {
                    id: 6,
                    length: 3,
                    root: H256::repeat_byte(6),
                },
            )),
            tickets: Arc::new(TicketManager::default()),
            gas: Arc::new(GasAccountant::new(GasCaps {
                max_gas_price: policy.max_gas_price,
                max_refund_amount: policy.max_refund_amount,
            })),
            turn: Arc::new(RwLock::new(TurnState {
                current_turn_index: if our_turn { 0 } else { 1 },
                roster: vec![me(), other()],
            })),
            paused: Arc::new(AtomicBool::new(false)),
            latest_beefy_block: Arc::new(AtomicU64::new(10)),
            last_submitted_block: Arc::new(AtomicU64::new(10)),
            policy,
        })
    }

    fn outcome(block: u64) -> TxOutcome {
        TxOutcome {
            txid: H256::repeat_byte(0xfe),
            executed: true,
            block_number: block,
            gas_used: U256::from(100_000u64),
            gas_price: U256::from(30u64),
        }
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_finalized() {
        let mut client = MockBeefyClientContract::new();
        let ticket_reads = Arc::new(AtomicUsize::new(0));
        let reads = ticket_reads.clone();
        client.expect_active_ticket().returning(move |hash| {
            // no ticket before the initial submission, ours afterwards
            if reads.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
                Ok(None)
            } else {
                Ok(Some(Ticket {
                    owner: me(),
                    commitment_hash: hash,
                }))
            }
        });
        client
            .expect_submit_initial()
            .times(1)
            .returning(|_, bitfield, proof| {
                assert_eq!(bitfield.set_indices(), vec![0, 2]);
                assert_eq!(proof.index, 0);
                Ok(outcome(100))
            });
        client.expect_block_number().returning(|| Ok(103));
        client
            .expect_commit_prev_randao()
            .times(1)
            .returning(|_| Ok(outcome(104)));
        client
            .expect_confirmed_signers()
            .returning(|_| Ok(vec![0, 1]));
        client
            .expect_submit_final()
            .times(1)
            .returning(|_, bitfield, proofs, _, _, tips| {
                assert_eq!(bitfield.set_indices(), vec![0]);
                assert_eq!(proofs.len(), 1);
                assert!(tips.is_empty());
                Ok(outcome(110))
            });
        client.expect_latest_beefy_block().returning(|| Ok(42));
        client.expect_current_validator_set().returning(|| {
            Ok(ValidatorSet {
                id: 5,
                length: 3,
                root: H256::repeat_byte(5),
            })
        });
        client.expect_next_validator_set().returning(|| {
            Ok(ValidatorSet {
                id: 6,
                length: 3,
                root: H256::repeat_byte(6),
            })
        });
        client
            .expect_credited_gas()
            .returning(|_| Ok(U256::from(3_000_000u64)));

        let ctx = ctx_with(client, true);
        let mut op = PendingSubmission::new(task(), ctx.clone());
        let hash = op.commitment_hash();

        // initial claim
        assert!(matches!(op.prepare().await, PrepareResult::Ready));
        assert!(matches!(op.submit().await, SubmitResult::Submitted));
        assert_eq!(op.state(), SubmissionState::InitialSubmitted);
        assert_eq!(ctx.tickets.active(me()).map(|t| t.commitment_hash), Some(hash));
        assert!(matches!(op.validate().await, ValidationResult::Valid));

        // randao commit
        assert!(matches!(op.prepare().await, PrepareResult::Ready));
        assert!(matches!(op.submit().await, SubmitResult::Submitted));
        assert_eq!(op.state(), SubmissionState::RandaoCommitted);
        assert!(matches!(op.validate().await, ValidationResult::Valid));

        // final submission; a cost credit arrives while it confirms
        assert!(matches!(op.prepare().await, PrepareResult::Ready));
        assert_eq!(op.state(), SubmissionState::FinalReady);
        assert!(matches!(op.submit().await, SubmitResult::Submitted));
        ctx.gas
            .credit(hash, me(), U256::from(100_000u64), U256::from(30u64));
        assert!(matches!(op.validate().await, ValidationResult::Valid));
        assert!(op.is_finalized());

        assert_eq!(ctx.tickets.active(me()), None);
        assert_eq!(ctx.gas.credited_gas(hash), U256::from(3_000_000u64));
        assert_eq!(ctx.latest_beefy_block.load(AtomicOrdering::Relaxed), 42);
        assert_eq!(ctx.last_submitted_block.load(AtomicOrdering::Relaxed), 42);
    }

    #[tokio::test]
    async fn losing_the_race_aborts_cleanly() {
        let mut client = MockBeefyClientContract::new();
        client.expect_active_ticket().returning(|_| Ok(None));
        client.expect_submit_initial().returning(|_, _, _| {
            Err(ChainCommunicationError::Reverted(
                "execution reverted: 0x60bbe44e".into(),
            ))
        });

        let ctx = ctx_with(client, true);
        let mut op = PendingSubmission::new(task(), ctx.clone());
        assert!(matches!(op.prepare().await, PrepareResult::Ready));
        assert!(matches!(op.submit().await, SubmitResult::Drop));
        assert_eq!(op.state(), SubmissionState::Idle);
        assert_eq!(ctx.tickets.active(me()), None);
    }

    #[tokio::test]
    async fn foreign_ticket_drops_the_lifecycle() {
        let mut client = MockBeefyClientContract::new();
        client.expect_active_ticket().returning(|hash| {
            Ok(Some(Ticket {
                owner: other(),
                commitment_hash: hash,
            }))
        });

        let ctx = ctx_with(client, true);
        let mut op = PendingSubmission::new(task(), ctx);
        assert!(matches!(op.prepare().await, PrepareResult::Drop));
    }

    #[tokio::test]
    async fn out_of_turn_waits_for_grace_period() {
        let mut client = MockBeefyClientContract::new();
        client.expect_is_grace_period_active().returning(|| Ok(true));

        let ctx = ctx_with(client, false);
        let mut op = PendingSubmission::new(task(), ctx);
        assert!(matches!(op.prepare().await, PrepareResult::NotReady));
        assert!(op.next_attempt_after().is_some());
    }

    #[tokio::test]
    async fn out_of_turn_respects_min_block_increment() {
        let mut client = MockBeefyClientContract::new();
        client.expect_is_grace_period_active().returning(|| Ok(false));
        client.expect_active_ticket().returning(|_| Ok(None));

        let ctx = ctx_with(client, false);
        // last submission at 40: commitment 42 is within the increment
        ctx.last_submitted_block.store(40, AtomicOrdering::Relaxed);
        let mut op = PendingSubmission::new(task(), ctx.clone());
        assert!(matches!(op.prepare().await, PrepareResult::NotReady));

        // far enough once the last submission is old
        ctx.last_submitted_block.store(10, AtomicOrdering::Relaxed);
        assert!(matches!(op.prepare().await, PrepareResult::Ready));
    }

    #[tokio::test]
    async fn superseded_commitment_is_dropped() {
        let client = MockBeefyClientContract::new();
        let ctx = ctx_with(client, true);
        ctx.latest_beefy_block.store(50, AtomicOrdering::Relaxed);
        let mut op = PendingSubmission::new(task(), ctx);
        assert!(matches!(op.prepare().await, PrepareResult::Drop));
    }

    #[tokio::test]
    async fn empty_final_set_abandons_the_ticket() {
        let mut client = MockBeefyClientContract::new();
        // confirmed signer 1 never appeared in the initial claim {0, 2}
        client.expect_confirmed_signers().returning(|_| Ok(vec![1]));
        client
            .expect_clear_ticket()
            .times(1)
            .returning(|| Ok(outcome(120)));

        let ctx = ctx_with(client, true);
        let mut op = PendingSubmission::new(task(), ctx.clone());
        ctx.tickets.acquire(me(), op.commitment_hash()).unwrap();
        op.force_state(SubmissionState::RandaoCommitted);

        assert!(matches!(op.prepare().await, PrepareResult::Drop));
        assert_eq!(op.state(), SubmissionState::Idle);
        assert_eq!(ctx.tickets.active(me()), None);
    }

    #[tokio::test]
    async fn upgrade_pauses_new_lifecycles() {
        let client = MockBeefyClientContract::new();
        let ctx = ctx_with(client, true);
        ctx.paused.store(true, AtomicOrdering::Relaxed);
        let mut op = PendingSubmission::new(task(), ctx);
        assert!(matches!(op.prepare().await, PrepareResult::Drop));
    }
}
