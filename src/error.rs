//! Error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::upstream::UpstreamError;

/// Top-level error type for relay operations
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or listener I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Upstream client or subscription failure
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
