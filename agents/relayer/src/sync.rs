//! Event ingestion: folds the light client's event stream into the local
//! mirror of contract state.
//!
//! Ingestion runs independently of submission: it never blocks on a
//! lifecycle, and lifecycles never wait for it. The mirror it maintains
//! is a cache; whenever the stream breaks or runs dry, the authoritative
//! state is re-read directly before the stream is restarted.

use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use prometheus::IntCounterVec;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info_span, instrument::Instrumented, warn, Instrument};

use beefy_base::CoreMetrics;
use beefy_core::{BeefyEvent, EventEnvelope, EventSource, RelayError};

use crate::msg::pending_submission::SubmissionContext;
use crate::validator_set::SetSlot;

/// Keep the de-duplication set from growing without bound.
const SEEN_CAPACITY: usize = 4096;
const SEEN_BLOCK_SLACK: u64 = 64;
const RESYNC_BACKOFF: Duration = Duration::from_secs(5);

/// Work loop draining the event source into the shared mirror.
pub struct EventIngestor {
    events: Box<dyn EventSource>,
    ctx: Arc<SubmissionContext>,
    /// Delivery is at-least-once; occurrences are deduped by
    /// (block number, log index).
    seen: HashSet<(u64, u64)>,
    last_block: u64,
    metrics: IngestorMetrics,
}

impl Debug for EventIngestor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventIngestor {{ last_block: {}, seen: {} }}",
            self.last_block,
            self.seen.len()
        )
    }
}

impl EventIngestor {
    /// Wire the ingestor to the shared mirror.
    pub fn new(
        events: Box<dyn EventSource>,
        ctx: Arc<SubmissionContext>,
        metrics: &CoreMetrics,
    ) -> Result<Self> {
        Ok(Self {
            events,
            ctx,
            seen: HashSet::new(),
            last_block: 0,
            metrics: IngestorMetrics::new(metrics)?,
        })
    }

    /// Spawn the work loop.
    pub fn spawn(mut self) -> Instrumented<JoinHandle<Result<()>>> {
        tokio::spawn(async move { self.work_loop().await })
            .instrument(info_span!("event ingestor"))
    }

    async fn work_loop(&mut self) -> Result<()> {
        loop {
            self.step().await;
        }
    }

    /// Handle one event-source yield.
    async fn step(&mut self) {
        match self.events.next_event().await {
            Ok(Some(envelope)) => {
                if !self.seen.insert(envelope.dedup_key()) {
                    return;
                }
                self.last_block = self.last_block.max(envelope.block_number);
                self.prune_seen();
                self.apply(envelope);
            }
            Ok(None) => {
                debug!(last_block = self.last_block, "Event stream exhausted, restarting");
                self.resync().await;
            }
            Err(err) => {
                warn!(error = %err, last_block = self.last_block, "Event stream failed, resyncing");
                self.resync().await;
            }
        }
    }

    /// Re-read authoritative state and restart the stream. Any events the
    /// mirror missed while the stream was down are covered by the direct
    /// reads; the stream then replays from the last processed block.
    async fn resync(&mut self) {
        match self.ctx.client.state().await {
            Ok(state) => {
                {
                    let mut turn = self.ctx.turn.write();
                    turn.roster = state.relayers;
                    turn.set_index(state.current_turn_index);
                }
                if let Err(err) = self
                    .ctx
                    .validator_sets
                    .update(state.current_validator_set, SetSlot::Current)
                {
                    warn!(error = %err, "Could not refresh current validator set");
                }
                if let Err(err) = self
                    .ctx
                    .validator_sets
                    .update(state.next_validator_set, SetSlot::Next)
                {
                    warn!(error = %err, "Could not refresh next validator set");
                }
                self.ctx
                    .latest_beefy_block
                    .fetch_max(state.latest_beefy_block, AtomicOrdering::Relaxed);
            }
            Err(err) => {
                warn!(error = %err, "Could not re-read client state");
            }
        }
        if let Err(err) = self.events.restart_from(self.last_block).await {
            warn!(error = %err, "Could not restart event stream");
            sleep(RESYNC_BACKOFF).await;
        }
    }

    fn prune_seen(&mut self) {
        if self.seen.len() > SEEN_CAPACITY {
            let floor = self.last_block.saturating_sub(SEEN_BLOCK_SLACK);
            self.seen.retain(|(block, _)| *block >= floor);
        }
    }

    fn apply(&mut self, envelope: EventEnvelope) {
        let EventEnvelope {
            block_number,
            log_index,
            event,
        } = envelope;
        self.metrics.observe(&event);
        match event {
            BeefyEvent::RelayerAdded { relayer } => {
                self.ctx.turn.write().apply_added(relayer);
            }
            BeefyEvent::RelayerRemoved { relayer } => {
                self.ctx.turn.write().apply_removed(relayer);
            }
            BeefyEvent::TurnAdvanced { index } => {
                self.ctx.turn.write().set_index(index);
            }
            BeefyEvent::GasCredited {
                relayer,
                commitment_hash,
                gas_used,
                gas_price,
            } => {
                let credited = self
                    .ctx
                    .gas
                    .credit(commitment_hash, relayer, gas_used, gas_price);
                debug!(
                    ?commitment_hash,
                    ?relayer,
                    ?credited,
                    block_number,
                    log_index,
                    "Folded gas credit"
                );
            }
            BeefyEvent::TipAdded { beefy_block, amount } => {
                self.ctx.gas.record_tip(beefy_block, amount);
            }
            BeefyEvent::TipsClaimed { relayer, amount } => match self.ctx.gas.claim(relayer) {
                Ok(local) if local != amount => {
                    warn!(
                        ?relayer,
                        ?local,
                        ?amount,
                        "Claimed amount disagrees with the local ledger"
                    );
                }
                Ok(_) => {}
                Err(RelayError::NothingToClaim) => {
                    warn!(?relayer, ?amount, "Observed a claim with no local balance");
                }
                Err(err) => {
                    warn!(?relayer, error = %err, "Claim bookkeeping failed");
                }
            },
            BeefyEvent::SubmissionRefunded { relayer, amount } => {
                debug!(?relayer, ?amount, "Submission refunded");
            }
            BeefyEvent::Upgraded { implementation } => {
                if self.ctx.policy.resume_after_upgrade {
                    warn!(
                        ?implementation,
                        "Implementation upgraded, resuming per configuration"
                    );
                } else {
                    self.ctx.paused.store(true, AtomicOrdering::Relaxed);
                    error!(
                        ?implementation,
                        "Implementation upgraded, pausing submission until operator confirmation"
                    );
                }
            }
        }
    }
}

#[derive(Debug)]
struct IngestorMetrics {
    events: IntCounterVec,
    agent: String,
}

impl IngestorMetrics {
    fn new(metrics: &CoreMetrics) -> Result<Self> {
        Ok(Self {
            events: metrics.new_int_counter(
                "events_total",
                "Light client events folded into the local mirror",
                &["agent", "event"],
            )?,
            agent: metrics.agent_name().to_owned(),
        })
    }

    fn observe(&self, event: &BeefyEvent) {
        let kind = match event {
            BeefyEvent::RelayerAdded { .. } => "relayer_added",
            BeefyEvent::RelayerRemoved { .. } => "relayer_removed",
            BeefyEvent::TurnAdvanced { .. } => "turn_advanced",
            BeefyEvent::GasCredited { .. } => "gas_credited",
            BeefyEvent::TipAdded { .. } => "tip_added",
            BeefyEvent::TipsClaimed { .. } => "tips_claimed",
            BeefyEvent::SubmissionRefunded { .. } => "submission_refunded",
            BeefyEvent::Upgraded { .. } => "upgraded",
        };
        self.events.with_label_values(&[&self.agent, kind]).inc();
    }
}
