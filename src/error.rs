//! Error types for the Sluice library.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Sluice operations.
#[derive(Error, Debug)]
pub enum SluiceError {
    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),

    /// A tiered limiter rejected the request, identifying the violated
    /// strategy's limit and window
    #[error("limit of {limit} per {window:?} exceeded")]
    StrategyViolation { limit: u64, window: Duration },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Sluice operations.
pub type Result<T> = std::result::Result<T, SluiceError>;
