//! Network error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for network operations.
pub type NetResult<T> = Result<T, NetError>;

/// Errors that can occur talking to block-data endpoints.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("no healthy endpoint available: {0}")]
    Exhausted(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl NetError {
    pub fn invalid_response(endpoint: &str, reason: impl Into<String>) -> Self {
        NetError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    /// True when every candidate endpoint has been ruled out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, NetError::Exhausted(_))
    }
}
