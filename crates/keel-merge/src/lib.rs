//! # Keel Merge
//!
//! The merge engine: three-way tree merge with line-level content merging,
//! the classic strategy set, and similarity-based rename detection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod content;
mod error;
mod rename;
mod tree_merge;

pub use content::{is_binary, merge_content};
pub use error::{MergeError, Result};
pub use rename::{detect_renames, Rename};
pub use tree_merge::{merge_octopus, merge_trees, Conflict, MergeOutcome, MergeStrategy};
