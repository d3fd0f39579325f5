//! Error types for Relay

use thiserror::Error;

use crate::recovery::classifier::ProviderError;

/// Result type alias for Relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Main error type for Relay
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Classified provider failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Persistence collaborator errors
    #[error("Store error: {0}")]
    Store(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Operation was cancelled
    #[error("Operation was cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl RelayError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a new HTTP error
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http(message.into())
    }

    /// Create a new generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(format!("invalid TOML: {}", error))
    }
}
