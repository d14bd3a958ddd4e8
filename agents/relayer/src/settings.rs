//! Relayer configuration.

use std::time::Duration;

use eyre::{Context, Result};
use serde::Deserialize;

use beefy_base::settings::{load_settings, ConfigError, LoadableFromSettings, Settings};
use beefy_core::U256;

/// Settings for the BEEFY relayer agent.
///
/// Big-number amounts are configured as decimal strings so they survive
/// every config backend without silent truncation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerSettings {
    /// Settings shared with every agent.
    #[serde(flatten)]
    pub base: Settings,

    /// Gas price cap applied when computing refund credits, in wei.
    pub max_gas_price: String,
    /// Upper bound on the refund claimable by this relayer, in wei.
    pub max_refund_amount: String,
    /// Minimum beefy block distance from the last accepted submission
    /// before an out-of-turn submission is attempted.
    #[serde(default = "default_min_block_increment")]
    pub min_block_increment: u32,
    /// Execution blocks to wait after the initial submission before
    /// committing prev-randao.
    #[serde(default = "default_randao_commit_delay_blocks")]
    pub randao_commit_delay_blocks: u64,
    /// Delay between consecutive transaction sends, in milliseconds.
    /// Keeps sequential submissions off the same pending nonce.
    #[serde(default = "default_submission_pacing_millis")]
    pub submission_pacing_millis: u64,
    /// Upper bound on any single chain interaction, in seconds.
    #[serde(default = "default_tx_timeout_secs")]
    pub tx_timeout_secs: u64,
    /// Seconds allowed for a final submission to be reflected in the
    /// client state before the lifecycle falls back and starts over.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    /// Keep submitting after an observed implementation upgrade instead
    /// of pausing for operator confirmation. Off by default.
    #[serde(default)]
    pub resume_after_upgrade: bool,
}

fn default_min_block_increment() -> u32 {
    10
}

fn default_randao_commit_delay_blocks() -> u64 {
    3
}

fn default_submission_pacing_millis() -> u64 {
    2_000
}

fn default_tx_timeout_secs() -> u64 {
    60
}

fn default_confirm_timeout_secs() -> u64 {
    600
}

impl AsRef<Settings> for RelayerSettings {
    fn as_ref(&self) -> &Settings {
        &self.base
    }
}

impl LoadableFromSettings for RelayerSettings {
    fn load() -> Result<Self, ConfigError> {
        load_settings()
    }
}

/// The parsed policy knobs a submission lifecycle consults.
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
    /// Gas price cap for refund credits, in wei.
    pub max_gas_price: U256,
    /// Refund cap per relayer claim, in wei.
    pub max_refund_amount: U256,
    /// Minimum beefy block distance for out-of-turn submissions.
    pub min_block_increment: u32,
    /// Execution blocks between initial submission and randao commit.
    pub randao_commit_delay_blocks: u64,
    /// Delay between consecutive transaction sends.
    pub pacing: Duration,
    /// Bound on any single chain interaction.
    pub tx_timeout: Duration,
    /// Bound on waiting for a final submission to be reflected on chain.
    pub confirm_timeout: Duration,
    /// Whether to keep submitting past an implementation upgrade.
    pub resume_after_upgrade: bool,
}

impl RelayerSettings {
    /// Parse the policy knobs out of their config representation.
    pub fn policy(&self) -> Result<SubmissionPolicy> {
        Ok(SubmissionPolicy {
            max_gas_price: U256::from_dec_str(&self.max_gas_price)
                .context("invalid maxGasPrice")?,
            max_refund_amount: U256::from_dec_str(&self.max_refund_amount)
                .context("invalid maxRefundAmount")?,
            min_block_increment: self.min_block_increment,
            randao_commit_delay_blocks: self.randao_commit_delay_blocks,
            pacing: Duration::from_millis(self.submission_pacing_millis),
            tx_timeout: Duration::from_secs(self.tx_timeout_secs),
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
            resume_after_upgrade: self.resume_after_upgrade,
        })
    }
}
