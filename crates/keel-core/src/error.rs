//! Core error types.

use thiserror::Error;

/// Errors produced by the object model and byte-level codecs.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed object id (wrong length or non-hex characters).
    #[error("invalid object id: {0}")]
    InvalidId(String),

    /// Object bytes that violate the format they claim to carry.
    #[error("corrupt object: {0}")]
    Corrupt(String),

    /// Compression or decompression failure.
    #[error("compression error: {0}")]
    Compression(String),

    /// Operation cancelled through an abort signal.
    #[error("operation aborted")]
    Aborted,
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
