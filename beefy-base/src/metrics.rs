//! Useful metrics that all agents should track.

use std::sync::Arc;

use eyre::Result;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry};
use tokio::task::JoinHandle;

/// Metrics shared by every agent in this workspace.
#[derive(Debug)]
pub struct CoreMetrics {
    agent_name: String,
    submitter_queue_length: Box<IntGaugeVec>,
    submission_outcomes: Box<IntCounterVec>,
    listen_port: Option<u16>,
    /// Metrics registry for adding new metrics and gathering reports
    registry: Arc<Registry>,
}

impl CoreMetrics {
    /// Track metrics for a particular agent name.
    pub fn new<S: Into<String>>(
        for_agent: S,
        listen_port: Option<u16>,
        registry: Arc<Registry>,
    ) -> prometheus::Result<CoreMetrics> {
        let metrics = CoreMetrics {
            agent_name: for_agent.into(),
            submitter_queue_length: Box::new(IntGaugeVec::new(
                Opts::new(
                    "submitter_queue_length",
                    "Pending operations per submitter queue",
                )
                .namespace("beefy")
                .const_label("VERSION", env!("CARGO_PKG_VERSION")),
                &["agent", "queue"],
            )?),
            submission_outcomes: Box::new(IntCounterVec::new(
                Opts::new(
                    "submission_outcomes_total",
                    "Count of submission lifecycle outcomes since boot",
                )
                .namespace("beefy")
                .const_label("VERSION", env!("CARGO_PKG_VERSION")),
                &["agent", "outcome"],
            )?),
            listen_port,
            registry,
        };

        metrics
            .registry
            .register(metrics.submitter_queue_length.clone())?;
        metrics
            .registry
            .register(metrics.submission_outcomes.clone())?;

        Ok(metrics)
    }

    /// Register an int gauge.
    pub fn new_int_gauge(
        &self,
        metric_name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<IntGaugeVec> {
        let gauge = IntGaugeVec::new(
            Opts::new(metric_name, help)
                .namespace("beefy")
                .const_label("VERSION", env!("CARGO_PKG_VERSION")),
            labels,
        )?;
        self.registry.register(Box::new(gauge.clone()))?;

        Ok(gauge)
    }

    /// Register an int counter.
    pub fn new_int_counter(
        &self,
        metric_name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<IntCounterVec> {
        let counter = IntCounterVec::new(
            Opts::new(metric_name, help)
                .namespace("beefy")
                .const_label("VERSION", env!("CARGO_PKG_VERSION")),
            labels,
        )?;
        self.registry.register(Box::new(counter.clone()))?;

        Ok(counter)
    }

    /// Gauge of pending operations per submitter queue.
    ///
    /// Labels needed: `agent`, `queue`.
    pub fn submitter_queue_length(&self) -> IntGaugeVec {
        *self.submitter_queue_length.clone()
    }

    /// Counter of lifecycle outcomes.
    ///
    /// Labels needed: `agent`, `outcome`.
    pub fn submission_outcomes(&self) -> IntCounterVec {
        *self.submission_outcomes.clone()
    }

    /// The name of the agent these metrics belong to.
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics
    /// format) report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    /// Run an HTTP server serving OpenMetrics format reports on `/metrics`
    ///
    /// This is compatible with Prometheus, which ought to be configured to
    /// scrape me!
    pub fn run_http_server(self: Arc<CoreMetrics>) -> JoinHandle<()> {
        use warp::Filter;
        match self.listen_port {
            None => {
                tracing::info!("not starting prometheus server");
                tokio::spawn(std::future::ready(()))
            }
            Some(port) => {
                tracing::info!(port, "starting prometheus server on 0.0.0.0:{port}");
                tokio::spawn(async move {
                    warp::serve(
                        warp::path!("metrics")
                            .map(move || {
                                warp::reply::with_header(
                                    self.gather().expect("failed to encode metrics"),
                                    "Content-Type",
                                    "text/plain; charset=utf-8",
                                )
                            })
                            .or(warp::any().map(|| {
                                warp::reply::with_status(
                                    "go look at /metrics",
                                    warp::http::StatusCode::NOT_FOUND,
                                )
                            })),
                    )
                    .run(([0, 0, 0, 0], port))
                    .await;
                })
            }
        }
    }
}
