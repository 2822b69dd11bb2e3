//! Error types for parley-api

use thiserror::Error;

/// Result type alias using parley-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status
    #[error("Server error {status}: {message}")]
    Status { status: u16, message: String },

    /// Backend reported an error in-band (error frame or `{error}` body)
    #[error("{0}")]
    Api(String),

    /// Stream violated the frame protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Model not present in the catalog
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Reading a local file for upload failed
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build a status error, preferring the backend's `detail` field when present
    pub fn status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| match v.get("detail") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            })
            .unwrap_or_else(|| body.trim().to_string());
        Self::Status { status, message }
    }

    /// Whether this is the 401 the backend sends for a missing or expired session
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Status { status: 401, .. })
    }
}
