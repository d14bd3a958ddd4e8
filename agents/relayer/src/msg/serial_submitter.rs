use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use derive_new::new;
use eyre::{bail, Result};
use prometheus::{IntCounter, IntGauge};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info_span, instrument, instrument::Instrumented, Instrument};

use beefy_base::CoreMetrics;

use super::pending_operation::*;

/// The serial submitter owns the single transaction execution slot: it
/// accepts pending submissions over a channel and drives each lifecycle
/// one stage per pass, preparing the next transaction immediately before
/// sending it and validating every send against authoritative chain state
/// before moving on.
///
/// Only one transaction is in flight at a time. That matches the ticket
/// protocol (one pending submission per relayer) and keeps sequential
/// sends off the same pending nonce; consecutive sends are additionally
/// paced by a configurable delay.
///
/// Operations that fail retriably are retained and retried with backoff;
/// operations that lose their race or exhaust their lifecycle are dropped
/// with their tickets cleared.
#[derive(Debug, new)]
pub struct SerialSubmitter {
    /// Receiver for new operations to drive.
    rx: mpsc::UnboundedReceiver<QueuedOperation>,
    /// Delay between consecutive transaction sends.
    pacing: Duration,
    /// Operations waiting for their next prepare/submit pass.
    #[new(default)]
    run_queue: BinaryHeap<Reverse<QueuedOperation>>,
    /// Operations with an unconfirmed send.
    #[new(default)]
    validation_queue: BinaryHeap<Reverse<QueuedOperation>>,
    /// Metrics for the serial submitter.
    metrics: SerialSubmitterMetrics,
}

impl SerialSubmitter {
    /// Spawn the work loop.
    pub fn spawn(mut self) -> Instrumented<JoinHandle<Result<()>>> {
        tokio::spawn(async move { self.work_loop().await })
            .instrument(info_span!("serial submitter work loop"))
    }

    #[instrument(skip_all)]
    async fn work_loop(&mut self) -> Result<()> {
        loop {
            self.tick_read()?;
            self.update_metrics();
            self.tick_process().await?;
            self.update_metrics();
            self.tick_validate().await?;
            self.update_metrics();
            sleep(Duration::from_millis(200)).await;
        }
    }

    /// Fetch any new operations from the channel.
    fn tick_read(&mut self) -> Result<()> {
        loop {
            match self.rx.try_recv() {
                Ok(op) => {
                    self.run_queue.push(Reverse(op));
                }
                Err(TryRecvError::Empty) => {
                    break;
                }
                Err(_) => {
                    bail!("Disconnected submitter channel or fatal err");
                }
            }
        }
        Ok(())
    }

    /// Prepare and submit the next eligible operation.
    async fn tick_process(&mut self) -> Result<()> {
        let Some(Reverse(mut op)) = self.run_queue.pop() else {
            return Ok(());
        };

        // deferred operations stay queued until their backoff elapses
        if let Some(after) = op.0.next_attempt_after() {
            if after > Instant::now() {
                self.run_queue.push(Reverse(op));
                return Ok(());
            }
        }

        match op.0.prepare().await {
            PrepareResult::Ready => {
                self.metrics.ops_prepared.inc();
            }
            PrepareResult::NotReady => {
                self.run_queue.push(Reverse(op));
                return Ok(());
            }
            PrepareResult::Retry => {
                self.metrics.ops_failed.inc();
                self.run_queue.push(Reverse(op));
                return Ok(());
            }
            PrepareResult::Drop => {
                self.metrics.ops_dropped.inc();
                return Ok(());
            }
            PrepareResult::CriticalFailure(err) => {
                return Err(err);
            }
        }

        match op.0.submit().await {
            SubmitResult::Submitted => {
                self.metrics.ops_submitted.inc();
                self.validation_queue.push(Reverse(op));
                // rate-limit consecutive sends
                sleep(self.pacing).await;
            }
            SubmitResult::Retry => {
                self.metrics.ops_failed.inc();
                self.run_queue.push(Reverse(op));
            }
            SubmitResult::Drop => {
                self.metrics.ops_dropped.inc();
            }
            SubmitResult::CriticalFailure(err) => {
                return Err(err);
            }
        }

        Ok(())
    }

    /// Validate submitted operations against authoritative state.
    async fn tick_validate(&mut self) -> Result<()> {
        while let Some(Reverse(mut op)) = self.validation_queue.pop() {
            match op.0.validate().await {
                ValidationResult::Valid => {
                    if op.0.is_finalized() {
                        self.metrics.ops_finalized.inc();
                    } else {
                        // lifecycle has further stages; send it around again
                        self.run_queue.push(Reverse(op));
                    }
                }
                ValidationResult::NotReady => {
                    self.validation_queue.push(Reverse(op));
                    break;
                }
                ValidationResult::Retry => {
                    self.validation_queue.push(Reverse(op));
                    break;
                }
                ValidationResult::Invalid => {
                    self.metrics.ops_failed.inc();
                    self.run_queue.push(Reverse(op));
                }
                ValidationResult::CriticalFailure(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn update_metrics(&self) {
        self.metrics
            .run_queue_length
            .set(self.run_queue.len() as i64);
        self.metrics
            .validation_queue_length
            .set(self.validation_queue.len() as i64);
    }
}

/// Metrics for the serial submitter.
#[derive(Debug)]
pub struct SerialSubmitterMetrics {
    run_queue_length: IntGauge,
    validation_queue_length: IntGauge,
    ops_prepared: IntCounter,
    ops_submitted: IntCounter,
    ops_finalized: IntCounter,
    ops_dropped: IntCounter,
    ops_failed: IntCounter,
}

impl SerialSubmitterMetrics {
    /// Wire the submitter metrics into the shared registry.
    pub fn new(metrics: &CoreMetrics) -> Self {
        let agent = metrics.agent_name().to_owned();
        Self {
            run_queue_length: metrics
                .submitter_queue_length()
                .with_label_values(&[&agent, "run_queue"]),
            validation_queue_length: metrics
                .submitter_queue_length()
                .with_label_values(&[&agent, "validation_queue"]),
            ops_prepared: metrics
                .submission_outcomes()
                .with_label_values(&[&agent, "prepared"]),
            ops_submitted: metrics
                .submission_outcomes()
                .with_label_values(&[&agent, "submitted"]),
            ops_finalized: metrics
                .submission_outcomes()
                .with_label_values(&[&agent, "finalized"]),
            ops_dropped: metrics
                .submission_outcomes()
                .with_label_values(&[&agent, "dropped"]),
            ops_failed: metrics
                .submission_outcomes()
                .with_label_values(&[&agent, "failed"]),
        }
    }
}
