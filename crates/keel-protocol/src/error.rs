//! Protocol error types.

use keel_core::CoreError;
use keel_odb::OdbError;
use keel_pack::PackError;
use thiserror::Error;

/// Errors that can occur in the smart-HTTP wire layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// pkt-line framing violation or malformed request body.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Syntactically invalid input, e.g. a malformed object id.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The remote reported an error on the error side-band.
    #[error("remote error: {0}")]
    Remote(String),

    /// Operation cancelled through an abort signal.
    #[error("operation aborted")]
    Aborted,

    /// Error from the pack codec.
    #[error(transparent)]
    Pack(PackError),

    /// Error from the object database.
    #[error(transparent)]
    Odb(#[from] OdbError),

    /// I/O error from the byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PackError> for ProtocolError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::Aborted => ProtocolError::Aborted,
            other => ProtocolError::Pack(other),
        }
    }
}

impl From<CoreError> for ProtocolError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Aborted => ProtocolError::Aborted,
            CoreError::InvalidId(msg) => ProtocolError::InvalidInput(msg),
            other => ProtocolError::Protocol(other.to_string()),
        }
    }
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
