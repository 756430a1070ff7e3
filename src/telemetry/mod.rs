//! Logging initialization.
//!
//! Sets up tracing-subscriber with an env filter and a fmt layer.
//! `RUST_LOG` wins over the configured level when set.

pub mod worker;

use crate::error::{Error, Result};

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Fallback filter directive when `RUST_LOG` is unset (e.g. "info",
    /// "workq=debug").
    pub level: String,
    /// Use the compact single-line formatter.
    pub compact: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            compact: false,
        }
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the filter directive is malformed or a global
/// subscriber was already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::Config(format!("bad log level {:?}: {e}", config.level)))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.compact {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))
}
