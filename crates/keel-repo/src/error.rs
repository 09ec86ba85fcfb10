//! Repository error types.

use keel_core::CoreError;
use keel_merge::{Conflict, MergeError};
use keel_odb::OdbError;
use keel_pack::PackError;
use keel_protocol::ProtocolError;
use keel_storage::StorageError;
use thiserror::Error;

/// Errors that can occur in repository workflows.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A named branch does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// A revision string matched nothing.
    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    /// Syntactically invalid input (pathspec, URL, revision).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The merge produced conflicts.
    #[error("merge produced {} conflict(s)", .0.len())]
    Conflicts(Vec<Conflict>),

    /// A push that would lose remote history.
    #[error("non-fast-forward update on {0}; fetch first or force")]
    NonFastForward(String),

    /// Repository state that violates an invariant, including objects that
    /// went missing while collecting a push closure.
    #[error("corrupt repository: {0}")]
    Corrupt(String),

    /// Transport-level failure talking to a remote.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation cancelled through an abort signal.
    #[error("operation aborted")]
    Aborted,

    /// Error from the object database.
    #[error(transparent)]
    Odb(#[from] OdbError),

    /// Error from the merge engine.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Error from the wire protocol.
    #[error(transparent)]
    Protocol(ProtocolError),

    /// Error from the storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<PackError> for RepoError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::Aborted => RepoError::Aborted,
            PackError::Odb(OdbError::ObjectNotFound(id)) => {
                // A hole in the closure is repository corruption, not a
                // lookup miss.
                RepoError::Corrupt(format!("object {} missing from closure", id))
            }
            other => RepoError::Corrupt(other.to_string()),
        }
    }
}

impl From<ProtocolError> for RepoError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Aborted => RepoError::Aborted,
            other => RepoError::Protocol(other),
        }
    }
}

impl From<CoreError> for RepoError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Aborted => RepoError::Aborted,
            other => RepoError::Corrupt(other.to_string()),
        }
    }
}

/// A specialized Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;
