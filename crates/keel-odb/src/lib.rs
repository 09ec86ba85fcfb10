//! # Keel ODB
//!
//! The repository-side stores: loose objects, references, the staging
//! index, and the config file. Everything is expressed over the
//! [`keel_storage::Storage`] trait so the same code serves in-memory,
//! local-disk, and key-value deployments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod index;
mod objects;
mod refs;
mod tree_builder;

pub use config::Config;
pub use error::{OdbError, Result};
pub use index::{Index, IndexEntry};
pub use objects::ObjectDatabase;
pub use refs::{Head, RefDatabase};
pub use tree_builder::{flatten_tree, write_path_tree};

/// Directory every repository keeps its state under.
pub const GIT_DIR: &str = ".git";
