//! Error types for the offline cache controller.

use thiserror::Error;

/// Result type alias for controller operations.
pub type SwResult<T> = Result<T, SwError>;

/// Errors that can occur while handling worker events.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Precache of {url} failed: {reason}")]
    Precache { url: String, reason: String },

    #[error("Offline fallback {0} is not cached")]
    OfflineFallbackMissing(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwError {
    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state error.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Whether this error came from the transport rather than from the controller itself.
    pub fn is_network(&self) -> bool {
        matches!(self, SwError::Network(_) | SwError::Http(_))
    }
}

impl From<url::ParseError> for SwError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
