use std::time::Duration;

use thiserror::Error;

/// Custom error type for Fabula operations.
#[derive(Debug, Error)]
pub enum FabulaError {
    /// Configuration is invalid or incomplete. Fatal, surfaced at
    /// resolution time and never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generative backend call failed (transport, provider error).
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The generative backend did not answer within the configured timeout.
    #[error("Backend timed out after {timeout:?}")]
    BackendTimeout { timeout: Duration },

    /// The backend answered, but the response could not be decoded for the
    /// task at hand (classification payloads, choice lists).
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Vector index lookup failed. The retrieval pipeline degrades on this
    /// instead of propagating it.
    #[error("Vector search error: {0}")]
    VectorSearch(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl FabulaError {
    /// Backend error without an underlying source.
    pub fn backend(message: impl Into<String>) -> Self {
        FabulaError::Backend {
            message: message.into(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for FabulaError {
    fn from(err: serde_json::Error) -> Self {
        FabulaError::MalformedResponse(format!("JSON decode error: {}", err))
    }
}

impl From<std::io::Error> for FabulaError {
    fn from(err: std::io::Error) -> Self {
        FabulaError::Config(format!("I/O error: {}", err))
    }
}
