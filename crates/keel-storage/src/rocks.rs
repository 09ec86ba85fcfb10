//! RocksDB storage backend.
//!
//! Models the object-store-plus-metadata-DB deployment: file bytes live in
//! the keyspace under `f/<path>`, a small JSON metadata record under
//! `m/<path>`. Directories are implicit in key prefixes; listing walks the
//! prefix range.

use crate::{now_millis, FileInfo, Result, Storage, StorageError};
use bytes::Bytes;
use rocksdb::{Direction, IteratorMode, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

const FILE_PREFIX: &str = "f/";
const META_PREFIX: &str = "m/";

#[derive(Debug, Serialize, Deserialize)]
struct MetaRecord {
    size: u64,
    modified: u64,
}

/// Storage persisted in a RocksDB keyspace.
pub struct RocksStorage {
    db: DB,
}

impl RocksStorage {
    /// Opens (or creates) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = DB::open_default(path.as_ref())
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn file_key(path: &str) -> Vec<u8> {
        format!("{}{}", FILE_PREFIX, Self::normalize(path)).into_bytes()
    }

    fn meta_key(path: &str) -> Vec<u8> {
        format!("{}{}", META_PREFIX, Self::normalize(path)).into_bytes()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    /// Collects every stored path below `dir` (exclusive of `dir` itself).
    fn descendants(&self, dir: &str) -> Result<Vec<String>> {
        let dir = Self::normalize(dir);
        let prefix = if dir.is_empty() {
            FILE_PREFIX.to_string()
        } else {
            format!("{}{}/", FILE_PREFIX, dir)
        };

        let mut paths = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, _) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let path = String::from_utf8_lossy(&key[FILE_PREFIX.len()..]).into_owned();
            paths.push(path);
        }
        Ok(paths)
    }
}

impl Storage for RocksStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.get(&Self::file_key(path))?.is_some())
    }

    fn read_file(&self, path: &str) -> Result<Bytes> {
        self.get(&Self::file_key(path))?
            .map(Bytes::from)
            .ok_or_else(|| StorageError::NotFound(Self::normalize(path)))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let meta = MetaRecord {
            size: data.len() as u64,
            modified: now_millis(),
        };
        let meta_bytes =
            serde_json::to_vec(&meta).map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut batch = WriteBatch::default();
        batch.put(Self::file_key(path), data);
        batch.put(Self::meta_key(path), meta_bytes);
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        if !self.exists(path)? {
            return Err(StorageError::NotFound(Self::normalize(path)));
        }
        let mut batch = WriteBatch::default();
        batch.delete(Self::file_key(path));
        batch.delete(Self::meta_key(path));
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn create_directory(&self, _path: &str) -> Result<()> {
        // Directories are implicit in key prefixes.
        Ok(())
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let dir = Self::normalize(path);
        let strip = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let mut children = BTreeSet::new();
        for descendant in self.descendants(&dir)? {
            if let Some(rest) = descendant.strip_prefix(&strip) {
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
        let mut batch = WriteBatch::default();
        for descendant in self.descendants(&Self::normalize(path))? {
            batch.delete(Self::file_key(&descendant));
            batch.delete(Self::meta_key(&descendant));
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        let raw = self
            .get(&Self::meta_key(path))?
            .ok_or_else(|| StorageError::NotFound(Self::normalize(path)))?;
        let meta: MetaRecord =
            serde_json::from_slice(&raw).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(FileInfo {
            size: meta.size,
            modified: meta.modified,
        })
    }
}
