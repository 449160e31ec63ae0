//! Error types shared by every TaskRelay crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RelayError>;

/// All failures surfaced by the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Caller input rejected before anything is persisted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A provider API answered with a non-success status.
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Map a provider HTTP status + body into the matching error variant.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let detail = format!("{provider} API error {status}: {body}");
        match status {
            401 | 403 => Self::AuthFailed(detail),
            404 => Self::NotFound(detail),
            _ => Self::Channel(detail),
        }
    }

    /// True for caller-side input problems.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
