use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Report, Result};
use futures_util::future::select_all;
use prometheus::Registry;
use tokio::task::JoinHandle;
use tracing::instrument::Instrumented;
use tracing::{info, info_span, Instrument};

use crate::metrics::CoreMetrics;
use crate::settings::{LoadableFromSettings, Settings};

/// A fundamental agent which does not make any assumptions about the tools
/// which are used.
///
/// The transport-facing collaborators (chain client, event source,
/// consensus feed) are supplied by the embedding binary through
/// [`BaseAgent::Clients`]; this keeps RPC plumbing out of the agent crates
/// while the engine stays fully wired and testable.
#[async_trait]
pub trait BaseAgent: Send + Sync + Debug {
    /// The agent's name
    const AGENT_NAME: &'static str;

    /// The settings object for this agent
    type Settings: LoadableFromSettings;

    /// The collaborators the embedder must supply.
    type Clients: Send;

    /// Instantiate the agent from the standard settings object
    async fn from_settings(
        settings: Self::Settings,
        clients: Self::Clients,
        metrics: Arc<CoreMetrics>,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Start running this agent.
    fn run(self) -> Instrumented<JoinHandle<Result<()>>>;
}

/// Call this from `main` to fully initialize and run the agent for its
/// entire lifecycle. This assumes only a single agent is being run. This
/// will initialize the metrics server and tracing as well.
pub async fn agent_main<A: BaseAgent>(clients: A::Clients) -> Result<()> {
    color_eyre::install()?;

    let settings = A::Settings::load()?;
    let core_settings: &Settings = settings.as_ref();
    core_settings.tracing.start_tracing()?;

    let metrics = Arc::new(CoreMetrics::new(
        A::AGENT_NAME,
        core_settings.metrics_port(),
        Arc::new(Registry::new()),
    )?);
    let _metrics_server = metrics.clone().run_http_server();

    let agent = A::from_settings(settings, clients, metrics).await?;
    agent.run().await??;
    info!(agent = A::AGENT_NAME, "Shutting down agent");
    Ok(())
}

/// Utility to run multiple tasks and shutdown if any one task ends.
#[allow(clippy::unit_arg)]
pub fn run_all(
    tasks: Vec<Instrumented<JoinHandle<Result<(), Report>>>>,
) -> Instrumented<JoinHandle<Result<()>>> {
    debug_assert!(!tasks.is_empty(), "No tasks submitted");
    let span = info_span!("run_all");
    tokio::spawn(async move {
        let (res, _, remaining) = select_all(tasks).await;
        for task in remaining.into_iter() {
            task.into_inner().abort();
        }
        res?
    })
    .instrument(span)
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn run_all_ends_when_any_task_ends() {
        let quick = tokio::spawn(async { Ok::<_, Report>(()) }).instrument(info_span!("quick"));
        let slow = tokio::spawn(async {
            sleep(Duration::from_secs(60)).await;
            Ok::<_, Report>(())
        })
        .instrument(info_span!("slow"));

        let res = run_all(vec![quick, slow]).await.unwrap();
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn run_all_propagates_the_first_error() {
        let failing = tokio::spawn(async { Err(eyre::eyre!("boom")) })
            .instrument(info_span!("failing"));
        let res = run_all(vec![failing]).await.unwrap();
        assert!(res.is_err());
    }
}
