//! In-memory storage backend.

use crate::{now_millis, FileInfo, Result, Storage, StorageError};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    modified: u64,
}

/// Storage backed by a map from path to bytes. Directories are implicit:
/// a path is a directory exactly when some stored file lives beneath it.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.read().contains_key(&Self::normalize(path)))
    }

    fn read_file(&self, path: &str) -> Result<Bytes> {
        let key = Self::normalize(path);
        self.files
            .read()
            .get(&key)
            .map(|e| e.data.clone())
            .ok_or(StorageError::NotFound(key))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let key = Self::normalize(path);
        self.files.write().insert(
            key,
            Entry {
                data: Bytes::copy_from_slice(data),
                modified: now_millis(),
            },
        );
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        let key = Self::normalize(path);
        self.files
            .write()
            .remove(&key)
            .map(|_| ())
            .ok_or(StorageError::NotFound(key))
    }

    fn create_directory(&self, _path: &str) -> Result<()> {
        // Directories exist implicitly once a descendant file does.
        Ok(())
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let key = Self::normalize(path);
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        };

        let files = self.files.read();
        let mut children = BTreeSet::new();
        for name in files.keys() {
            if let Some(rest) = name.strip_prefix(&prefix) {
                if let Some(child) = rest.split('/').next() {
                    if !child.is_empty() {
                        children.insert(child.to_string());
                    }
                }
            }
        }
        Ok(children.into_iter().collect())
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let key = Self::normalize(path);
        let prefix = format!("{}/", key);
        self.files
            .write()
            .retain(|name, _| name != &key && !name.starts_with(&prefix));
        Ok(())
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        let key = Self::normalize(path);
        self.files
            .read()
            .get(&key)
            .map(|e| FileInfo {
                size: e.data.len() as u64,
                modified: e.modified,
            })
            .ok_or(StorageError::NotFound(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip() {
        let storage = MemoryStorage::new();
        storage.write_file("a/b/c.txt", b"payload").unwrap();
        assert_eq!(storage.read_file("a/b/c.txt").unwrap().as_ref(), b"payload");
        assert!(storage.exists("a/b/c.txt").unwrap());
    }

    #[test]
    fn missing_file_is_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.read_file("nope"),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete_file("nope"),
            Err(StorageError::NotFound(_))
        ));
        assert!(!storage.exists("nope").unwrap());
    }

    #[test]
    fn list_immediate_children() {
        let storage = MemoryStorage::new();
        storage.write_file("refs/heads/main", b"x").unwrap();
        storage.write_file("refs/heads/dev", b"x").unwrap();
        storage.write_file("refs/tags/v1", b"x").unwrap();

        assert_eq!(storage.list_directory("refs").unwrap(), vec!["heads", "tags"]);
        assert_eq!(
            storage.list_directory("refs/heads").unwrap(),
            vec!["dev", "main"]
        );
        assert!(storage.list_directory("refs/remotes").unwrap().is_empty());
    }

    #[test]
    fn delete_directory_is_recursive() {
        let storage = MemoryStorage::new();
        storage.write_file("objects/ab/cd", b"x").unwrap();
        storage.write_file("objects/ef/gh", b"x").unwrap();
        storage.write_file("HEAD", b"x").unwrap();

        storage.delete_directory("objects").unwrap();
        assert!(!storage.exists("objects/ab/cd").unwrap());
        assert!(!storage.exists("objects/ef/gh").unwrap());
        assert!(storage.exists("HEAD").unwrap());
    }

    #[test]
    fn overwrite_replaces_content() {
        let storage = MemoryStorage::new();
        storage.write_file("f", b"one").unwrap();
        storage.write_file("f", b"two").unwrap();
        assert_eq!(storage.read_file("f").unwrap().as_ref(), b"two");
    }

    #[test]
    fn file_info_reports_size() {
        let storage = MemoryStorage::new();
        storage.write_file("f", b"12345").unwrap();
        let info = storage.file_info("f").unwrap();
        assert_eq!(info.size, 5);
    }
}
