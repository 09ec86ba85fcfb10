//! # Keel Server
//!
//! The smart-HTTP face of a set of Keel repositories.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/{repo}/HEAD` | Current HEAD, symbolic or detached |
//! | GET | `/{repo}/info/refs?service=...` | Service advertisement |
//! | POST | `/{repo}/git-upload-pack` | Fetch/clone |
//! | POST | `/{repo}/git-receive-pack` | Push |
//!
//! A trailing `.git` on the repository segment is accepted and ignored.
//! Each repository is a singleton actor: one mutex-guarded handle per name,
//! so ref updates, index writes, and pack ingestion never interleave within
//! a repository while separate repositories proceed in parallel.

#![forbid(unsafe_code)]

mod error;
mod router;
mod state;

pub use error::ServerError;
pub use router::create_router;
pub use state::{AppState, RepoHandle, RepoStore};
