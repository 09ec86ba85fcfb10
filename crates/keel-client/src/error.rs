//! Client error types.

use keel_odb::OdbError;
use keel_repo::RepoError;
use keel_storage::StorageError;
use thiserror::Error;

/// Errors surfaced to the front-end.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The path does not hold a repository.
    #[error("not a keel repository: {0}")]
    NotARepository(String),

    /// No file at a given pathspec.
    #[error("pathspec '{0}' did not match any files")]
    PathspecMismatch(String),

    /// A remote name with no configured URL.
    #[error("no such remote: {0}")]
    UnknownRemote(String),

    /// Error from a repository workflow.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// Error from the storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Error from the object database.
    #[error(transparent)]
    Odb(#[from] OdbError),
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
