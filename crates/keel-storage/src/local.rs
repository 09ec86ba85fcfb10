//! Local filesystem storage backend.

use crate::{FileInfo, Result, Storage, StorageError};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Storage rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Opens storage rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
            full.push(part);
        }
        full
    }

    fn map_not_found(err: std::io::Error, path: &str) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

impl Storage for LocalStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).is_file())
    }

    fn read_file(&self, path: &str) -> Result<Bytes> {
        std::fs::read(self.full_path(path))
            .map(Bytes::from)
            .map_err(|e| Self::map_not_found(e, path))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, data)?;
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        std::fs::remove_file(self.full_path(path)).map_err(|e| Self::map_not_found(e, path))
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        std::fs::create_dir_all(self.full_path(path))?;
        Ok(())
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let full = self.full_path(path);
        if !full.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(full)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        match std::fs::remove_dir_all(full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        let meta =
            std::fs::metadata(self.full_path(path)).map_err(|e| Self::map_not_found(e, path))?;
        if !meta.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(FileInfo {
            size: meta.len(),
            modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn write_creates_parents() {
        let (_dir, storage) = storage();
        storage.write_file("deep/nested/file", b"data").unwrap();
        assert_eq!(storage.read_file("deep/nested/file").unwrap().as_ref(), b"data");
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.read_file("absent"),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.file_info("absent"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn list_directory_sorted() {
        let (_dir, storage) = storage();
        storage.write_file("refs/heads/zeta", b"x").unwrap();
        storage.write_file("refs/heads/alpha", b"x").unwrap();
        assert_eq!(
            storage.list_directory("refs/heads").unwrap(),
            vec!["alpha", "zeta"]
        );
    }

    #[test]
    fn delete_directory_recursive_and_idempotent() {
        let (_dir, storage) = storage();
        storage.write_file("objects/ab/cd", b"x").unwrap();
        storage.delete_directory("objects").unwrap();
        assert!(!storage.exists("objects/ab/cd").unwrap());
        // Deleting again is not an error.
        storage.delete_directory("objects").unwrap();
    }

    #[test]
    fn file_info_size() {
        let (_dir, storage) = storage();
        storage.write_file("f", b"123").unwrap();
        assert_eq!(storage.file_info("f").unwrap().size, 3);
    }
}
