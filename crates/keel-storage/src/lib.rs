//! # Keel Storage
//!
//! A uniform key-to-bytes surface with a directory-like listing, backing the
//! object database, ref store, and index. Three implementations ship:
//! in-memory (tests, ephemeral servers), local filesystem, and a
//! RocksDB-backed variant where directories are implicit in key prefixes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod local;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use error::{Result, StorageError};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStorage;

use bytes::Bytes;

/// Basic metadata of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, milliseconds since the Unix epoch.
    pub modified: u64,
}

/// The storage contract every backend satisfies.
///
/// Paths are forward-slash separated and rooted at the repository the
/// backend was opened for. Backends may treat directories as implicit:
/// `list_directory` must still report the immediate children of any path
/// with at least one descendant file, and writes must materialize parents.
pub trait Storage: Send + Sync {
    /// Returns true if a file exists at `path`.
    fn exists(&self, path: &str) -> Result<bool>;

    /// Reads the file at `path`.
    fn read_file(&self, path: &str) -> Result<Bytes>;

    /// Writes `data` to `path`, creating parents as needed.
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Deletes the file at `path`.
    fn delete_file(&self, path: &str) -> Result<()>;

    /// Creates a directory. Backends with implicit directories may no-op.
    fn create_directory(&self, path: &str) -> Result<()>;

    /// Lists the immediate-children names (files and directories) of `path`.
    fn list_directory(&self, path: &str) -> Result<Vec<String>>;

    /// Recursively deletes every descendant of `path`.
    fn delete_directory(&self, path: &str) -> Result<()>;

    /// Returns size and modification time of the file at `path`.
    fn file_info(&self, path: &str) -> Result<FileInfo>;
}

impl<T: Storage + ?Sized> Storage for std::sync::Arc<T> {
    fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path)
    }

    fn read_file(&self, path: &str) -> Result<Bytes> {
        (**self).read_file(path)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        (**self).write_file(path, data)
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        (**self).delete_file(path)
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        (**self).create_directory(path)
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        (**self).list_directory(path)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        (**self).delete_directory(path)
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        (**self).file_info(path)
    }
}

/// Returns the current wall clock as milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
