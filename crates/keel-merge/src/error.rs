//! Merge error types.

use keel_odb::OdbError;
use thiserror::Error;

/// Errors that can occur while merging. Conflicts are not errors here;
/// they are a normal outcome reported through [`crate::MergeOutcome`].
#[derive(Debug, Error)]
pub enum MergeError {
    /// Too few inputs for the requested strategy.
    #[error("invalid merge input: {0}")]
    InvalidInput(String),

    /// Error from the object database.
    #[error(transparent)]
    Odb(#[from] OdbError),
}

/// A specialized Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;
