//! Error types for the Turnstile crate.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Only construction and startup can fail. Admission decisions on the
/// request path never produce an error; a rejected request is a normal
/// outcome reported through the HTTP status.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A quota that cannot be turned into a token bucket
    #[error("Invalid quota: {0}")]
    InvalidQuota(String),

    /// A rejection status that is not a valid HTTP status code
    #[error("Invalid rejection status: {0}")]
    InvalidStatus(u16),

    /// Layered configuration source errors
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
