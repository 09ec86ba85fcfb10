//! # Keel Repo
//!
//! The repository facade. Orchestrates the object database, ref store,
//! index, pack codec, and merge engine into the operations a user actually
//! runs: init, add, commit, branch, checkout, merge, rebase, reset, and the
//! clone/fetch/push workflows over a pluggable transport.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod history;
mod remote;
mod repository;

pub use error::{RepoError, Result};
pub use remote::{parse_remote_url, Transport};
pub use repository::{RepoConfig, Repository, Status};
