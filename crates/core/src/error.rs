//! Core Error Types
//!
//! Errors raised by the storage primitives themselves: malformed setting
//! addresses and unrecognized mode or scope names. Driver, crypto and file
//! failures belong to the main crate's `AppError`.

use thiserror::Error;

/// Core error type for the DeskKit workspace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A setting address that violates the scope/user-id pairing or has an
    /// empty component
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unrecognized storage mode or scope text
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
