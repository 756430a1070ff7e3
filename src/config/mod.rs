//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if a variable is set to something
//! that does not parse. Every variable has a default.

use crate::error::{Error, Result};
use crate::telemetry::TelemetryConfig;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct Config {
    /// Worker pool size for dispatch.
    pub workers: usize,
    pub log_level: String,
    pub log_compact: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let workers = match optional_var("WORKQ_WORKERS") {
            Some(raw) => parse_workers(&raw)?,
            None => DEFAULT_WORKERS,
        };
        let log_compact = match optional_var("WORKQ_LOG_COMPACT") {
            Some(raw) => parse_bool("WORKQ_LOG_COMPACT", &raw)?,
            None => false,
        };

        Ok(Self {
            workers,
            log_level: optional_var("WORKQ_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_compact,
        })
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            level: self.log_level.clone(),
            compact: self.log_compact,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            log_level: "info".to_string(),
            log_compact: false,
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_workers(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(Error::Config("WORKQ_WORKERS must be at least 1".to_string())),
        Ok(n) => Ok(n),
        Err(e) => Err(Error::Config(format!(
            "WORKQ_WORKERS is not a worker count ({raw:?}): {e}"
        ))),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{name} is not a boolean: {raw:?}"))),
    }
}
