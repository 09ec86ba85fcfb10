//! # Keel Core
//!
//! Object model and byte-level primitives shared by every Keel crate:
//! object identifiers, the four Git object kinds with their codecs, and the
//! varint / zlib helpers the pack format is built on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod abort;
mod commit;
mod error;
mod object;
mod oid;
mod tree;
pub mod varint;
pub mod zlib;

pub use abort::AbortSignal;
pub use commit::{Commit, Signature, Tag};
pub use error::{CoreError, Result};
pub use object::{GitObject, ObjectKind};
pub use oid::ObjectId;
pub use tree::{EntryMode, Tree, TreeEntry};
