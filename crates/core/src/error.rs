//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid storage key: {0}")]
    InvalidStorageKey(String),

    #[error("invalid upload status: {0}")]
    InvalidStatus(String),

    #[error("invalid chunk size: {size} (must be between {min} and {max})")]
    InvalidChunkSize { size: u64, min: u64, max: u64 },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
