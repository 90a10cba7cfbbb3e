//! Error types for the static IP setting feature
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for feature operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the static IP setting feature
#[derive(Error, Debug)]
pub enum Error {
    /// Store-related errors (read, write, directory listing)
    #[error("store error: {0}")]
    Store(String),

    /// Watch registration or delivery errors
    #[error("watch error: {0}")]
    Watch(String),

    /// Key not present in the store
    #[error("key not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid value read from the store
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Apply-step specific error
    #[error("apply error ({applier}): {message}")]
    Apply {
        /// Applier name
        applier: String,
        /// Error message
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a watch error
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an apply-step error
    pub fn apply(applier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Apply {
            applier: applier.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
