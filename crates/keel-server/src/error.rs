//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keel_protocol::{PktLine, ProtocolError};
use keel_repo::RepoError;
use thiserror::Error;

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Unknown repository or route.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request body or query.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The client went away; the handler stopped without partial commits.
    #[error("request aborted")]
    Aborted,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Aborted => ServerError::Aborted,
            ProtocolError::Protocol(_) | ProtocolError::InvalidInput(_) => {
                ServerError::BadRequest(err.to_string())
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<RepoError> for ServerError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Aborted => ServerError::Aborted,
            RepoError::InvalidInput(msg) => ServerError::BadRequest(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<keel_odb::OdbError> for ServerError {
    fn from(err: keel_odb::OdbError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "message": "Not Found" })),
            )
                .into_response(),
            ServerError::BadRequest(message) => {
                // Protocol errors answer in the protocol's own framing:
                // one pkt-line of error text, then a flush.
                let mut body = PktLine::Data(format!("{}\n", message).into_bytes()).encode();
                body.extend_from_slice(b"0000");
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ServerError::Aborted => {
                // 499 Client Closed Request, empty body.
                let status = StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, ()).into_response()
            }
            ServerError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
        }
    }
}
