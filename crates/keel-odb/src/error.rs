//! Object database error types.

use keel_core::CoreError;
use keel_storage::StorageError;
use thiserror::Error;

/// Errors that can occur in the object, ref, and index stores.
#[derive(Debug, Error)]
pub enum OdbError {
    /// No object with the given id.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// No reference with the given name.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// Stored bytes that violate their format.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Error from the object model or codecs.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from the storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A specialized Result type for object database operations.
pub type Result<T> = std::result::Result<T, OdbError>;
