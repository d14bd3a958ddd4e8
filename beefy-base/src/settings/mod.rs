//! Settings and configuration for the BEEFY relay agents.
//!
//! All agents share the [`Settings`] struct in this crate and define any
//! additional settings in their own crate, flattened over the base.
//!
//! Configuration key/value pairs are loaded in the following order, with
//! later sources taking precedence:
//!
//! 1. `config/default`
//! 2. `config/$RUN_MODE` (defaults to `development`)
//! 3. Environment variables prefixed with `BEEFY`, e.g.
//!    `BEEFY_METRICS=9090` sets the `metrics` key.

use std::env;

pub use config::ConfigError;

use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub use trace::{Level, Style, TracingConfig};

mod trace;

/// Connection details for the chain hosting the light client. The actual
/// transport is built by the embedder; agents only carry the knobs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSetup {
    /// Human-readable chain name, used in logs and metric labels.
    pub name: String,
    /// RPC endpoint url.
    pub url: String,
    /// Address of the deployed BEEFY light client contract.
    pub beefy_client: String,
}

/// Settings shared by every agent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Port to listen for prometheus scrape requests.
    pub metrics: Option<String>,
    /// The chain hosting the light client.
    pub ethereum: ChainSetup,
    /// The tracing configuration.
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Settings {
    /// The metrics port, if one was configured.
    pub fn metrics_port(&self) -> Option<u16> {
        self.metrics.as_ref().and_then(|v| v.parse().ok())
    }
}

/// Settings of an agent defined from configuration.
pub trait LoadableFromSettings: AsRef<Settings> + Sized {
    /// Create a new instance of these settings by reading the configs and
    /// env vars.
    fn load() -> Result<Self, ConfigError>;
}

/// Read settings from the config files and environment.
pub fn load_settings<T: DeserializeOwned>() -> Result<T, ConfigError> {
    let env_path = format!(
        "config/{}",
        env::var("RUN_MODE").as_deref().unwrap_or("development")
    );
    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&env_path).required(false))
        // Add in settings from the environment (with a prefix of BEEFY)
        // Eg.. `BEEFY_METRICS=9090` would set the `metrics` key
        .add_source(Environment::with_prefix("BEEFY"))
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn metrics_port_parses_or_is_none() {
        let mut settings = Settings::default();
        assert_eq!(settings.metrics_port(), None);
        settings.metrics = Some("9090".into());
        assert_eq!(settings.metrics_port(), Some(9090));
        settings.metrics = Some("not-a-port".into());
        assert_eq!(settings.metrics_port(), None);
    }

    #[test]
    fn settings_deserialize_from_camel_case() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "metrics": "9090",
                "ethereum": {
                    "name": "sepolia",
                    "url": "http://localhost:8545",
                    "beefyClient": "0x00000000000000000000000000000000000000aa"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.ethereum.name, "sepolia");
        assert!(settings.ethereum.beefy_client.ends_with("aa"));
    }
}
