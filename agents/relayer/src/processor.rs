//! Commitment intake: pulls signed commitments off the consensus source
//! and hands eligible ones to the serial submitter.

use std::collections::VecDeque;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, Result};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, info_span, instrument::Instrumented, warn, Instrument};

use beefy_core::CommitmentTask;

use crate::msg::pending_operation::QueuedOperation;
use crate::msg::pending_submission::{PendingSubmission, SubmissionContext};
use crate::validator_set::SetSlot;

/// Work loop turning consensus-side commitment tasks into pending
/// submissions. Ordering guards run here so the submitter only ever sees
/// commitments that could plausibly be accepted:
///
/// - commitments at or below the mirrored latest beefy block are already
///   synced and ignored;
/// - commitments signed by a set beyond the tracked next set are deferred
///   until the mandatory handoff updates catch up.
#[derive(Debug)]
pub struct CommitmentProcessor {
    commitments: mpsc::Receiver<CommitmentTask>,
    submitter_tx: mpsc::UnboundedSender<QueuedOperation>,
    ctx: Arc<SubmissionContext>,
    deferred: VecDeque<CommitmentTask>,
}

impl CommitmentProcessor {
    /// Wire the processor between the consensus source and the submitter.
    pub fn new(
        commitments: mpsc::Receiver<CommitmentTask>,
        submitter_tx: mpsc::UnboundedSender<QueuedOperation>,
        ctx: Arc<SubmissionContext>,
    ) -> Self {
        Self {
            commitments,
            submitter_tx,
            ctx,
            deferred: VecDeque::new(),
        }
    }

    /// Spawn the work loop.
    pub fn spawn(mut self) -> Instrumented<tokio::task::JoinHandle<Result<()>>> {
        tokio::spawn(async move { self.work_loop().await })
            .instrument(info_span!("commitment processor"))
    }

    async fn work_loop(&mut self) -> Result<()> {
        loop {
            // revisit deferred commitments; the tracked sets may have
            // caught up since they arrived
            for _ in 0..self.deferred.len() {
                if let Some(task) = self.deferred.pop_front() {
                    self.handle(task)?;
                }
            }

            match timeout(Duration::from_secs(1), self.commitments.recv()).await {
                Ok(Some(task)) => self.handle(task)?,
                Ok(None) => {
                    info!("Consensus source closed, shutting down processor");
                    return Ok(());
                }
                Err(_) => {} // idle tick
            }
        }
    }

    fn handle(&mut self, task: CommitmentTask) -> Result<()> {
        let commitment = &task.signed_commitment.commitment;
        let block_number = commitment.block_number as u64;

        let latest = self.ctx.latest_beefy_block.load(AtomicOrdering::Relaxed);
        if block_number <= latest {
            debug!(
                block_number,
                latest, "Commitment already synced, ignoring"
            );
            return Ok(());
        }

        let next_id = self.ctx.validator_sets.get(SetSlot::Next).id;
        if commitment.validator_set_id > next_id {
            warn!(
                validator_set_id = commitment.validator_set_id,
                next_id, "Commitment ahead of tracked validator sets, deferring"
            );
            self.deferred.push_back(task);
            return Ok(());
        }

        debug!(
            block_number,
            validator_set_id = commitment.validator_set_id,
            "Handing commitment to submitter"
        );
        let pending = PendingSubmission::new(task, self.ctx.clone());
        self.submitter_tx
            .send(QueuedOperation(Box::new(pending)))
            .map_err(|_| eyre!("submitter channel closed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, AtomicU64};

    use parking_lot::RwLock;

    use super::*;
    use crate::gas::{GasAccountant, GasCaps};
    use crate::settings::SubmissionPolicy;
    use crate::ticket::TicketManager;
    use crate::turn::TurnState;
    use crate::validator_set::ValidatorSetTracker;
    use beefy_core::{
        Commitment, MmrLeaf, MmrProof, MockBeefyClientContract, PayloadItem, Signature,
        SignedCommitment, StaticIdentity, ValidatorSet, H160, H256, U256, MMR_ROOT_PAYLOAD_ID,
    };

    fn ctx() -> Arc<SubmissionContext> {
        Arc::new(SubmissionContext {
            client: Arc::new(MockBeefyClientContract::new()),
            identity: Arc::new(StaticIdentity(H160::repeat_byte(0xaa))),
            validator_sets: Arc::new(ValidatorSetTracker::new(
                ValidatorSet { id: 5, length: 3, root: H256::repeat_byte(5) },
                ValidatorSet { id: 6, length: 3, root: H256::repeat_byte(6) },
            )),
            tickets: Arc::new(TicketManager::default()),
            gas: Arc::new(GasAccountant::new(GasCaps {
                max_gas_price: U256::from(40u64),
                max_refund_amount: U256::from(3_000_000u64),
            })),
            turn: Arc::new(RwLock::new(TurnState::default())),
            paused: Arc::new(AtomicBool::new(false)),
            latest_beefy_block: Arc::new(AtomicU64::new(10)),
            last_submitted_block: Arc::new(AtomicU64::new(10)),
            policy: SubmissionPolicy {
                max_gas_price: U256::from(40u64),
                max_refund_amount: U256::from(3_000_000u64),
                min_block_increment: 10,
                randao_commit_delay_blocks: 3,
                pacing: Duration::ZERO,
                tx_timeout: Duration::from_secs(1),
                confirm_timeout: Duration::from_secs(600),
                resume_after_upgrade: false,
            },
        })
    }

    fn task(block_number: u32, validator_set_id: u64) -> CommitmentTask {
        let sig = Signature::from_beefy_bytes([7u8; 65]);
        CommitmentTask {
            signed_commitment: SignedCommitment {
                commitment: Commitment {
                    block_number,
                    validator_set_id,
                    payload: vec![PayloadItem {
                        id: MMR_ROOT_PAYLOAD_ID,
                        data: vec![0x11; 32],
                    }],
                },
                signatures: vec![Some(sig), None, None],
            },
            validators: vec![H160::repeat_byte(1)],
            leaf: MmrLeaf::default(),
            leaf_proof: MmrProof::default(),
        }
    }

    fn processor() -> (
        CommitmentProcessor,
        mpsc::Sender<CommitmentTask>,
        mpsc::UnboundedReceiver<QueuedOperation>,
    ) {
        let (task_tx, task_rx) = mpsc::channel(8);
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        (
            CommitmentProcessor::new(task_rx, submit_tx, ctx()),
            task_tx,
            submit_rx,
        )
    }

    #[tokio::test]
    async fn eligible_commitments_reach_the_submitter() {
        let (mut processor, _task_tx, mut submit_rx) = processor();
        processor.handle(task(42, 5)).unwrap();
        let op = submit_rx.try_recv().unwrap();
        assert_eq!(op.0.priority_block(), 42);
    }

    #[tokio::test]
    async fn already_synced_commitments_are_ignored() {
        let (mut processor, _task_tx, mut submit_rx) = processor();
        processor.handle(task(10, 5)).unwrap();
        processor.handle(task(9, 5)).unwrap();
        assert!(submit_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn commitments_ahead_of_the_next_set_are_deferred() {
        let (mut processor, _task_tx, mut submit_rx) = processor();
        processor.handle(task(42, 7)).unwrap();
        assert!(submit_rx.try_recv().is_err());
        assert_eq!(processor.deferred.len(), 1);

        // the handoff catches up
        processor
            .ctx
            .validator_sets
            .update(
                ValidatorSet { id: 7, length: 3, root: H256::repeat_byte(7) },
                SetSlot::Next,
            )
            .unwrap();
        let task = processor.deferred.pop_front().unwrap();
        processor.handle(task).unwrap();
        assert!(submit_rx.try_recv().is_ok());
    }
}
