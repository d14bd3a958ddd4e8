use eyre::Result;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

/// Logging level. A "higher level" means more will be logged.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    /// Off
    Off = 0,
    /// Error
    Error = 1,
    /// Warn
    Warn = 2,
    /// Debug
    Debug = 3,
    /// Trace
    Trace = 5,
    /// Info
    #[serde(other)]
    #[default]
    Info = 4,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Info => LevelFilter::INFO,
        }
    }
}

/// Log output format.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    /// Single-line key=value records.
    #[default]
    Compact,
    /// Multi-line human-oriented output.
    Pretty,
    /// One JSON object per record.
    Json,
}

/// Configuration for the tracing subscribers used by the agents.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    fmt: Style,
    #[serde(default)]
    level: Level,
}

impl TracingConfig {
    /// Attempt to instantiate and register a tracing subscriber setup from
    /// settings.
    pub fn start_tracing(&self) -> Result<()> {
        let mut target_layer = Targets::new().with_default(self.level);
        if self.level < Level::Trace {
            // only show these debug and trace logs at trace level
            target_layer = target_layer.with_target("hyper", Level::Info);
            target_layer = target_layer.with_target("warp", Level::Info);
        }
        let err_layer = tracing_error::ErrorLayer::default();
        let registry = tracing_subscriber::registry()
            .with(target_layer)
            .with(err_layer);

        match self.fmt {
            Style::Compact => registry
                .with(tracing_subscriber::fmt::layer().compact())
                .try_init()?,
            Style::Pretty => registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?,
            Style::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn levels_deserialize_case_insensitively_enough() {
        let level: Level = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(level, Level::Debug);
        // unknown strings fall back to info
        let level: Level = serde_json::from_str("\"verbose\"").unwrap();
        assert_eq!(level, Level::Info);
    }

    #[test]
    fn trace_is_the_most_verbose_level() {
        assert!(Level::Trace > Level::Info);
        assert!(Level::Off < Level::Error);
    }
}
