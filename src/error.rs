//! Error types for workq.
//!
//! The queue and dispatcher never fail; these cover configuration and
//! logging setup only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
