//! # Keel Protocol
//!
//! The smart-HTTP wire layer: pkt-line framing, service advertisement, and
//! the upload-pack / receive-pack services, plus the client-side codecs for
//! the same messages. Everything here is transport-agnostic byte transforms;
//! the HTTP server and client wrap these in axum and reqwest respectively.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod advertise;
mod error;
mod pktline;
mod receive;
mod upload;

pub use advertise::{advertise_refs, parse_advertisement, Advertisement, Service};
pub use error::{ProtocolError, Result};
pub use pktline::{PktLine, PktReader, PktWriter, MAX_PKT_PAYLOAD};
pub use receive::{
    build_push_request, handle_receive_pack, parse_push_response, RefUpdate, ReportStatus,
};
pub use upload::{build_fetch_request, handle_upload_pack, parse_fetch_response, FetchRequest};

/// Capabilities advertised for `git-upload-pack`.
pub const UPLOAD_CAPABILITIES: &str = "multi_ack_detailed side-band-64k thin-pack ofs-delta";
/// Capabilities advertised for `git-receive-pack`.
pub const RECEIVE_CAPABILITIES: &str = "report-status delete-refs ofs-delta";
