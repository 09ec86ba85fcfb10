//! Reference storage.
//!
//! Every ref is a file under the git directory holding `<oid>\n`. HEAD is
//! special: either `ref: refs/heads/<branch>\n` (symbolic) or a bare oid
//! (detached).

use crate::{OdbError, Result, GIT_DIR};
use keel_core::ObjectId;
use keel_storage::{Storage, StorageError};
use std::sync::Arc;

/// The state of HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// HEAD names a branch, e.g. `refs/heads/main`.
    Symbolic(String),
    /// HEAD points directly at a commit.
    Detached(ObjectId),
}

impl Head {
    /// Returns the branch name when HEAD is symbolic under `refs/heads/`.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Head::Symbolic(target) => target.strip_prefix("refs/heads/"),
            Head::Detached(_) => None,
        }
    }

    /// Serializes to the HEAD file content.
    pub fn to_content(&self) -> String {
        match self {
            Head::Symbolic(target) => format!("ref: {}\n", target),
            Head::Detached(id) => format!("{}\n", id),
        }
    }
}

/// Hierarchical reference store over a storage backend.
#[derive(Debug, Clone)]
pub struct RefDatabase<S> {
    storage: Arc<S>,
}

impl<S: Storage> RefDatabase<S> {
    /// Creates a ref database over `storage`.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn ref_path(name: &str) -> String {
        format!("{}/{}", GIT_DIR, name)
    }

    /// Reads a ref, returning `None` when it does not exist.
    pub fn read(&self, name: &str) -> Result<Option<ObjectId>> {
        match self.storage.read_file(&Self::ref_path(name)) {
            Ok(bytes) => {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|_| OdbError::Corrupt(format!("ref {} is not UTF-8", name)))?;
                Ok(Some(ObjectId::from_hex(text.trim())?))
            }
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a ref.
    pub fn write(&self, name: &str, id: &ObjectId) -> Result<()> {
        self.storage
            .write_file(&Self::ref_path(name), format!("{}\n", id).as_bytes())?;
        Ok(())
    }

    /// Deletes a ref.
    pub fn delete(&self, name: &str) -> Result<()> {
        match self.storage.delete_file(&Self::ref_path(name)) {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound(_)) => Err(OdbError::RefNotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists every ref under `refs/`, flattened and sorted by name.
    pub fn list(&self) -> Result<Vec<(String, ObjectId)>> {
        let mut out = Vec::new();
        self.walk("refs", &mut out)?;
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn walk(&self, dir: &str, out: &mut Vec<(String, ObjectId)>) -> Result<()> {
        for child in self.storage.list_directory(&Self::ref_path(dir))? {
            let name = format!("{}/{}", dir, child);
            if self.storage.exists(&Self::ref_path(&name))? {
                if let Some(id) = self.read(&name)? {
                    out.push((name, id));
                }
            } else {
                self.walk(&name, out)?;
            }
        }
        Ok(())
    }

    /// Reads HEAD. A missing HEAD file reads as symbolic `refs/heads/main`,
    /// matching what an empty repository advertises.
    pub fn read_head(&self) -> Result<Head> {
        let path = format!("{}/HEAD", GIT_DIR);
        let bytes = match self.storage.read_file(&path) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                return Ok(Head::Symbolic("refs/heads/main".to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let text = std::str::from_utf8(&bytes)
            .map_err(|_| OdbError::Corrupt("HEAD is not UTF-8".into()))?
            .trim();
        if let Some(target) = text.strip_prefix("ref: ") {
            Ok(Head::Symbolic(target.trim().to_string()))
        } else {
            Ok(Head::Detached(ObjectId::from_hex(text)?))
        }
    }

    /// Writes HEAD.
    pub fn write_head(&self, head: &Head) -> Result<()> {
        self.storage
            .write_file(&format!("{}/HEAD", GIT_DIR), head.to_content().as_bytes())?;
        Ok(())
    }

    /// Resolves HEAD to a commit id, `None` for an unborn branch.
    pub fn resolve_head(&self) -> Result<Option<ObjectId>> {
        match self.read_head()? {
            Head::Detached(id) => Ok(Some(id)),
            Head::Symbolic(target) => self.read(&target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::ObjectKind;
    use keel_storage::MemoryStorage;

    fn refs() -> RefDatabase<MemoryStorage> {
        RefDatabase::new(Arc::new(MemoryStorage::new()))
    }

    fn some_id(seed: &[u8]) -> ObjectId {
        ObjectId::hash_object(ObjectKind::Blob, seed)
    }

    #[test]
    fn write_read_delete() {
        let refs = refs();
        let id = some_id(b"a");
        refs.write("refs/heads/main", &id).unwrap();
        assert_eq!(refs.read("refs/heads/main").unwrap(), Some(id));

        refs.delete("refs/heads/main").unwrap();
        assert_eq!(refs.read("refs/heads/main").unwrap(), None);
        assert!(matches!(
            refs.delete("refs/heads/main"),
            Err(OdbError::RefNotFound(_))
        ));
    }

    #[test]
    fn list_flattens_hierarchy() {
        let refs = refs();
        let id = some_id(b"x");
        refs.write("refs/heads/main", &id).unwrap();
        refs.write("refs/heads/feature/login", &id).unwrap();
        refs.write("refs/tags/v1.0", &id).unwrap();
        refs.write("refs/remotes/origin/main", &id).unwrap();

        let names: Vec<String> = refs.list().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "refs/heads/feature/login",
                "refs/heads/main",
                "refs/remotes/origin/main",
                "refs/tags/v1.0",
            ]
        );
    }

    #[test]
    fn head_symbolic_roundtrip() {
        let refs = refs();
        refs.write_head(&Head::Symbolic("refs/heads/dev".into()))
            .unwrap();
        let head = refs.read_head().unwrap();
        assert_eq!(head, Head::Symbolic("refs/heads/dev".into()));
        assert_eq!(head.branch(), Some("dev"));
    }

    #[test]
    fn head_detached_roundtrip() {
        let refs = refs();
        let id = some_id(b"detached");
        refs.write_head(&Head::Detached(id)).unwrap();
        let head = refs.read_head().unwrap();
        assert_eq!(head, Head::Detached(id));
        assert_eq!(head.branch(), None);
    }

    #[test]
    fn missing_head_defaults_to_main() {
        let refs = refs();
        assert_eq!(
            refs.read_head().unwrap(),
            Head::Symbolic("refs/heads/main".into())
        );
        assert_eq!(refs.resolve_head().unwrap(), None);
    }

    #[test]
    fn resolve_head_through_branch() {
        let refs = refs();
        let id = some_id(b"tip");
        refs.write("refs/heads/main", &id).unwrap();
        refs.write_head(&Head::Symbolic("refs/heads/main".into()))
            .unwrap();
        assert_eq!(refs.resolve_head().unwrap(), Some(id));
    }
}
