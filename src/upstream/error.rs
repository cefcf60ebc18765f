//! Upstream error types

use thiserror::Error;

/// Errors raised by the upstream client or reported by a live subscription
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP client construction or transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("Unexpected status code {0}")]
    Status(u16),

    /// Upstream answered with something other than an event stream
    #[error("Unexpected content type {0:?}")]
    InvalidContentType(String),

    /// The subscription request could not be prepared
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed event stream
    #[error("Event stream error: {0}")]
    Stream(String),

    /// Upstream client could not be constructed
    #[error("Connection failed: {0}")]
    Connect(String),
}

impl From<reqwest_eventsource::Error> for UpstreamError {
    fn from(err: reqwest_eventsource::Error) -> Self {
        use reqwest_eventsource::Error as E;

        match err {
            E::Transport(e) => UpstreamError::Http(e),
            E::InvalidStatusCode(status, _) => UpstreamError::Status(status.as_u16()),
            E::InvalidContentType(value, _) => UpstreamError::InvalidContentType(
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            ),
            other => UpstreamError::Stream(other.to_string()),
        }
    }
}
