use std::cmp::Ordering;
use std::fmt::Debug;
use std::time::Instant;

use async_trait::async_trait;
use eyre::Report;

use beefy_core::H256;

/// A pending operation the serial submitter drives to completion.
///
/// Each pass through the submitter runs up to three stages:
///
/// 1) Prepare: re-reads whatever state the next transaction depends on,
/// checks that it is still worth sending, and assembles its payload. Runs
/// immediately before submit so the decision is as fresh as possible.
///
/// 2) Submit: sends the transaction for the current lifecycle stage and
/// reports how it went.
///
/// 3) Validate: checks that the effect of the submitted transaction is
/// actually reflected in authoritative chain state before the lifecycle
/// moves on (or finishes).
///
/// Operations whose lifecycle spans several transactions return `Valid`
/// with `is_finalized() == false`, which sends them around the loop again
/// for the next stage.
#[async_trait]
pub trait PendingOperation: Send + Sync + Debug {
    /// Hash of the commitment this operation is relaying.
    fn commitment_hash(&self) -> H256;

    /// Beefy block of the commitment; lower blocks are worked first.
    fn priority_block(&self) -> u32;

    /// Prepare the next transaction of this lifecycle.
    async fn prepare(&mut self) -> PrepareResult;

    /// Send the prepared transaction.
    async fn submit(&mut self) -> SubmitResult;

    /// Confirm the submitted transaction against authoritative state.
    async fn validate(&mut self) -> ValidationResult;

    /// Earliest instant at which this operation wants to be retried.
    fn next_attempt_after(&self) -> Option<Instant>;

    /// True once the lifecycle reached its terminal accepted state.
    fn is_finalized(&self) -> bool;
}

/// Outcome of the prepare stage.
pub enum PrepareResult {
    /// Payload assembled, ready to submit.
    Ready,
    /// Not eligible yet; try again after `next_attempt_after`.
    NotReady,
    /// A retriable error occurred; try again after `next_attempt_after`.
    Retry,
    /// The lifecycle is over (superseded, lost, or logic error); discard.
    Drop,
    /// Non-recoverable system failure; pass the error up the chain.
    CriticalFailure(Report),
}

/// Outcome of the submit stage.
pub enum SubmitResult {
    /// The transaction was sent and included.
    Submitted,
    /// Submission failed but the lifecycle can be re-evaluated and retried.
    Retry,
    /// The lifecycle is over; discard.
    Drop,
    /// Non-recoverable system failure; pass the error up the chain.
    CriticalFailure(Report),
}

/// Outcome of the validate stage.
pub enum ValidationResult {
    /// The submitted stage is reflected in authoritative state.
    Valid,
    /// Too early to tell; check again after `next_attempt_after`.
    NotReady,
    /// Could not read authoritative state; check again.
    Retry,
    /// The stage did not stick; re-run the lifecycle from its current
    /// (regressed) state.
    Invalid,
    /// Non-recoverable system failure; pass the error up the chain.
    CriticalFailure(Report),
}

/// Queue entry ordering operations by their next allowed attempt time;
/// operations that have never been deferred sort first, ties broken by
/// commitment block so earlier commitments land first.
#[derive(Debug)]
pub struct QueuedOperation(pub Box<dyn PendingOperation>);

impl PartialEq for QueuedOperation {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedOperation {}

impl PartialOrd for QueuedOperation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedOperation {
    fn cmp(&self, other: &Self) -> Ordering {
        use Ordering::*;
        match (self.0.next_attempt_after(), other.0.next_attempt_after()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Greater,
            (None, Some(_)) => Less,
            (None, None) => Equal,
        }
        .then_with(|| self.0.priority_block().cmp(&other.0.priority_block()))
    }
}
