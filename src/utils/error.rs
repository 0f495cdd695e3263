//! Error Handling
//!
//! Unified error types for the persistence layer.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Wrong passphrase, malformed or truncated ciphertext
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Probe or connection attempt failed
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Transient failures persisted past the retry budget
    #[error("Database operation failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    /// Operation failed inside a transaction; the transaction was rolled back
    #[error("Transaction rolled back: {source}")]
    Transaction {
        #[source]
        source: Box<AppError>,
    },

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a crypto error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Create a connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap the last failure of an exhausted retry loop
    pub fn retry_exhausted(attempts: u32, last: AppError) -> Self {
        Self::RetryExhausted {
            attempts,
            source: Box::new(last),
        }
    }

    /// Wrap a failure that forced a rollback
    pub fn transaction(source: AppError) -> Self {
        Self::Transaction {
            source: Box::new(source),
        }
    }

    /// True for the cancellation variant, including when it was wrapped by a
    /// rolled-back transaction.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Transaction { source } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<deskkit_core::CoreError> for AppError {
    fn from(err: deskkit_core::CoreError) -> Self {
        match err {
            deskkit_core::CoreError::Validation(msg) | deskkit_core::CoreError::Parse(msg) => {
                Self::Validation(msg)
            }
        }
    }
}
