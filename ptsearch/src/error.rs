//! Error types for ptsearch

use std::time::Duration;
use thiserror::Error;

/// ptsearch error type
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Configuration is structurally valid but unusable
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Embedding provider failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Vector store failed
    #[error("Store error: {0}")]
    StoreError(String),

    /// An upstream call did not finish in time
    #[error("{what} timed out after {}ms", .after.as_millis())]
    Timeout {
        /// Which collaborator timed out
        what: &'static str,
        /// The budget that expired
        after: Duration,
    },

    /// Invalid chunk record
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error came from an upstream collaborator
    /// (embedding provider or vector store) rather than from local logic.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingError(_) | Error::StoreError(_) | Error::Timeout { .. }
        )
    }
}

/// Result type alias for ptsearch operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("Background task failed: {}", err))
    }
}
