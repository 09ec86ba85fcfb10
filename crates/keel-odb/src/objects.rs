//! Loose object storage.
//!
//! Objects are stored deflate-compressed at `objects/<xx>/<38>` under the
//! git directory, where `xx` is the first two hex digits of the id. A write
//! whose id is already present is a no-op, which is what makes the store
//! append-only and de-duplicating.

use crate::{OdbError, Result, GIT_DIR};
use keel_core::{zlib, Commit, GitObject, ObjectId, ObjectKind, Tree};
use keel_storage::Storage;
use std::sync::Arc;

/// Content-addressed loose object database over a storage backend.
#[derive(Debug, Clone)]
pub struct ObjectDatabase<S> {
    storage: Arc<S>,
}

impl<S: Storage> ObjectDatabase<S> {
    /// Creates an object database over `storage`.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn object_path(id: &ObjectId) -> String {
        let hex = id.to_hex();
        format!("{}/objects/{}/{}", GIT_DIR, &hex[..2], &hex[2..])
    }

    /// Writes an object, returning its id. Writing bytes that are already
    /// stored returns the same id without touching storage.
    pub fn write(&self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::hash_object(kind, data);
        let path = Self::object_path(&id);
        if self.storage.exists(&path)? {
            return Ok(id);
        }

        let mut full = format!("{} {}\0", kind.as_str(), data.len()).into_bytes();
        full.extend_from_slice(data);
        let compressed = zlib::compress(&full)?;
        self.storage.write_file(&path, &compressed)?;
        Ok(id)
    }

    /// Stores an already-constructed object.
    pub fn put(&self, object: &GitObject) -> Result<ObjectId> {
        self.write(object.kind, &object.data)
    }

    /// Reads the object with the given id.
    pub fn read(&self, id: &ObjectId) -> Result<GitObject> {
        let path = Self::object_path(id);
        let compressed = self
            .storage
            .read_file(&path)
            .map_err(|e| match e {
                keel_storage::StorageError::NotFound(_) => {
                    OdbError::ObjectNotFound(id.to_hex())
                }
                other => OdbError::Storage(other),
            })?;

        let full = zlib::decompress(&compressed)?;
        let nul = full
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| OdbError::Corrupt(format!("object {} missing header", id)))?;

        let header = std::str::from_utf8(&full[..nul])
            .map_err(|_| OdbError::Corrupt(format!("object {} header is not ASCII", id)))?;
        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| OdbError::Corrupt(format!("object {} malformed header", id)))?;
        let kind = ObjectKind::parse(kind)?;
        let size: usize = size
            .parse()
            .map_err(|_| OdbError::Corrupt(format!("object {} bad size header", id)))?;

        let data = &full[nul + 1..];
        if data.len() != size {
            return Err(OdbError::Corrupt(format!(
                "object {} size header {} does not match payload {}",
                id,
                size,
                data.len()
            )));
        }

        Ok(GitObject {
            id: *id,
            kind,
            data: bytes::Bytes::copy_from_slice(data),
        })
    }

    /// Returns true if the object is stored.
    pub fn has(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.storage.exists(&Self::object_path(id))?)
    }

    /// Reads an object and parses it as a tree.
    pub fn read_tree(&self, id: &ObjectId) -> Result<Tree> {
        let object = self.read(id)?;
        if object.kind != ObjectKind::Tree {
            return Err(OdbError::Corrupt(format!(
                "object {} is a {}, expected tree",
                id, object.kind
            )));
        }
        Ok(Tree::parse(&object.data)?)
    }

    /// Reads an object and parses it as a commit.
    pub fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        let object = self.read(id)?;
        if object.kind != ObjectKind::Commit {
            return Err(OdbError::Corrupt(format!(
                "object {} is a {}, expected commit",
                id, object.kind
            )));
        }
        Ok(Commit::parse(&object.data)?)
    }

    /// Writes a tree object.
    pub fn write_tree(&self, tree: &Tree) -> Result<ObjectId> {
        self.write(ObjectKind::Tree, &tree.serialize())
    }

    /// Writes a commit object.
    pub fn write_commit(&self, commit: &Commit) -> Result<ObjectId> {
        self.write(ObjectKind::Commit, &commit.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{EntryMode, Signature, TreeEntry};
    use keel_storage::MemoryStorage;

    fn odb() -> ObjectDatabase<MemoryStorage> {
        ObjectDatabase::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn blob_roundtrip() {
        let odb = odb();
        let id = odb.write(ObjectKind::Blob, b"Hello, World!").unwrap();
        assert_eq!(id.to_hex(), "b45ef6fec89518d314f546fd6c97025f2b6a5f40");

        let object = odb.read(&id).unwrap();
        assert_eq!(object.kind, ObjectKind::Blob);
        assert_eq!(object.data.as_ref(), b"Hello, World!");
    }

    #[test]
    fn every_kind_roundtrips() {
        let odb = odb();
        for (kind, payload) in [
            (ObjectKind::Blob, b"blob payload".to_vec()),
            (ObjectKind::Tree, Vec::new()),
            (
                ObjectKind::Commit,
                b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\nauthor A <a@a> 0 +0000\ncommitter A <a@a> 0 +0000\n\nmsg".to_vec(),
            ),
            (ObjectKind::Tag, b"object e69de29bb2d1d6434b8b29ae775ad8c2e48c5391\ntype blob\ntag t\n\nmsg".to_vec()),
        ] {
            let id = odb.write(kind, &payload).unwrap();
            let object = odb.read(&id).unwrap();
            assert_eq!(object.kind, kind);
            assert_eq!(object.data.as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn rewriting_is_a_noop() {
        let odb = odb();
        let a = odb.write(ObjectKind::Blob, b"same").unwrap();
        let b = odb.write(ObjectKind::Blob, b"same").unwrap();
        assert_eq!(a, b);
        assert!(odb.has(&a).unwrap());
    }

    #[test]
    fn missing_object_is_object_not_found() {
        let odb = odb();
        let id = ObjectId::hash_object(ObjectKind::Blob, b"never written");
        assert!(!odb.has(&id).unwrap());
        assert!(matches!(odb.read(&id), Err(OdbError::ObjectNotFound(_))));
    }

    #[test]
    fn tree_and_commit_helpers() {
        let odb = odb();
        let blob = odb.write(ObjectKind::Blob, b"content").unwrap();

        let mut tree = Tree::new();
        tree.push(TreeEntry {
            mode: EntryMode::Regular,
            name: "file.txt".into(),
            id: blob,
        });
        let tree_id = odb.write_tree(&tree).unwrap();
        assert_eq!(odb.read_tree(&tree_id).unwrap(), tree);

        let commit = Commit {
            tree: tree_id,
            parents: vec![],
            author: Signature::new("T", "t@t.com", 0, "+0000"),
            committer: Signature::new("T", "t@t.com", 0, "+0000"),
            message: "first".into(),
        };
        let commit_id = odb.write_commit(&commit).unwrap();
        assert_eq!(odb.read_commit(&commit_id).unwrap(), commit);

        // Kind mismatches are corrupt, not silent.
        assert!(matches!(odb.read_tree(&blob), Err(OdbError::Corrupt(_))));
        assert!(matches!(odb.read_commit(&blob), Err(OdbError::Corrupt(_))));
    }

    #[test]
    fn empty_blob_and_tree_hashes() {
        let odb = odb();
        let blob = odb.write(ObjectKind::Blob, b"").unwrap();
        assert_eq!(blob.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        let tree = odb.write(ObjectKind::Tree, b"").unwrap();
        assert_eq!(tree.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }
}
