use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument::Instrumented};

use beefy_base::{run_all, BaseAgent, CoreMetrics};
use beefy_core::{BeefyClient, CommitmentTask, EventSource, RelayerIdentity};

use crate::gas::{GasAccountant, GasCaps};
use crate::msg::pending_submission::SubmissionContext;
use crate::msg::serial_submitter::{SerialSubmitter, SerialSubmitterMetrics};
use crate::processor::CommitmentProcessor;
use crate::settings::RelayerSettings;
use crate::sync::EventIngestor;
use crate::ticket::TicketManager;
use crate::turn::TurnState;
use crate::validator_set::ValidatorSetTracker;

/// The transport-facing collaborators an embedding binary supplies.
pub struct RelayerClients {
    /// The on-chain light client.
    pub client: Arc<dyn BeefyClient>,
    /// The light client's event stream.
    pub events: Box<dyn EventSource>,
    /// The relayer's signing identity.
    pub identity: Arc<dyn RelayerIdentity>,
    /// Signed commitments produced by the consensus source.
    pub commitments: mpsc::Receiver<CommitmentTask>,
}

/// The relayer agent: event ingestion, commitment intake and the serial
/// submitter, wired around one shared mirror of contract state.
pub struct BeefyRelayer {
    ctx: Arc<SubmissionContext>,
    ingestor: EventIngestor,
    processor: CommitmentProcessor,
    submitter: SerialSubmitter,
}

impl Debug for BeefyRelayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BeefyRelayer {{ relayer: {:?}, contract: {:?} }}",
            self.ctx.identity.address(),
            self.ctx.client.address()
        )
    }
}

#[async_trait]
impl BaseAgent for BeefyRelayer {
    const AGENT_NAME: &'static str = "relayer";

    type Settings = RelayerSettings;
    type Clients = RelayerClients;

    async fn from_settings(
        settings: Self::Settings,
        clients: Self::Clients,
        metrics: Arc<CoreMetrics>,
    ) -> Result<Self> {
        let policy = settings.policy()?;

        // Reconcile against authoritative state before consuming events.
        let state = clients
            .client
            .state()
            .await
            .wrap_err("fetch initial light client state")?;
        info!(
            latest_beefy_block = state.latest_beefy_block,
            validator_set_id = state.current_validator_set.id,
            next_validator_set_id = state.next_validator_set.id,
            relayers = state.relayers.len(),
            "Retrieved current light client state"
        );

        let ctx = Arc::new(SubmissionContext {
            client: clients.client.clone(),
            identity: clients.identity.clone(),
            validator_sets: Arc::new(ValidatorSetTracker::new(
                state.current_validator_set,
                state.next_validator_set,
            )),
            tickets: Arc::new(TicketManager::default()),
            gas: Arc::new(GasAccountant::new(GasCaps {
                max_gas_price: policy.max_gas_price,
                max_refund_amount: policy.max_refund_amount,
            })),
            turn: Arc::new(RwLock::new(TurnState {
                current_turn_index: state.current_turn_index,
                roster: state.relayers,
            })),
            paused: Arc::new(AtomicBool::new(false)),
            latest_beefy_block: Arc::new(AtomicU64::new(state.latest_beefy_block)),
            last_submitted_block: Arc::new(AtomicU64::new(state.latest_beefy_block)),
            policy: policy.clone(),
        });

        let (submitter_tx, submitter_rx) = mpsc::unbounded_channel();
        let submitter = SerialSubmitter::new(
            submitter_rx,
            policy.pacing,
            SerialSubmitterMetrics::new(&metrics),
        );
        let processor = CommitmentProcessor::new(clients.commitments, submitter_tx, ctx.clone());
        let ingestor = EventIngestor::new(clients.events, ctx.clone(), &metrics)?;

        Ok(Self {
            ctx,
            ingestor,
            processor,
            submitter,
        })
    }

    fn run(self) -> Instrumented<JoinHandle<Result<()>>> {
        run_all(vec![
            self.ingestor.spawn(),
            self.processor.spawn(),
            self.submitter.spawn(),
        ])
    }
}
