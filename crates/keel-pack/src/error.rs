//! Pack codec error types.

use keel_core::CoreError;
use keel_odb::OdbError;
use thiserror::Error;

/// Errors that can occur while reading or writing packs and deltas.
#[derive(Debug, Error)]
pub enum PackError {
    /// Byte-level violation of the pack or delta format.
    #[error("corrupt pack: {0}")]
    Corrupt(String),

    /// Delta entries whose bases never became available.
    #[error("unresolved deltas after {passes} passes: {remaining} remaining")]
    UnresolvedDelta {
        /// Resolution passes attempted.
        passes: usize,
        /// Delta entries still unresolved.
        remaining: usize,
    },

    /// Operation cancelled through an abort signal.
    #[error("operation aborted")]
    Aborted,

    /// Error from the object database.
    #[error(transparent)]
    Odb(#[from] OdbError),
}

impl From<CoreError> for PackError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Aborted => PackError::Aborted,
            other => PackError::Corrupt(other.to_string()),
        }
    }
}

/// A specialized Result type for pack operations.
pub type Result<T> = std::result::Result<T, PackError>;
