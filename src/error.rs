//! Error types for the Turnstile service.

use thiserror::Error;

use crate::store::StoreError;

/// Errors produced while admitting a batch of limiters.
///
/// Every variant is terminal for the call: nothing is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// Wrong number of arguments, or no limiters at all.
    #[error("wrong number of arguments: {0}")]
    Arity(String),

    /// An argument that should be an integer is not one.
    #[error("invalid arguments: cannot parse {field} of limiter {limiter}")]
    Parse { limiter: String, field: &'static str },

    /// The explicit timestamp is not an integer.
    #[error("invalid arguments: cannot parse timestamp")]
    ParseTimestamp,

    /// An integer argument is out of range for its limiter.
    #[error("invalid arguments: {reason} for limiter {limiter}")]
    Validation { limiter: String, reason: &'static str },

    /// The stored value for a key is not a valid bucket scalar.
    #[error("wrong type for key {key}: {reason}")]
    KeyType { key: String, reason: &'static str },

    /// The store failed to read or write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Main error type for Turnstile service operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Admission errors
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for TurnstileError {
    fn from(err: ::config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile service operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
