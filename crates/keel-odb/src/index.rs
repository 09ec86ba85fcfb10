//! The staging index (DIRC v2).
//!
//! Binary layout, all integers big-endian:
//!
//! ```text
//! Header:   "DIRC" | version u32 (=2) | entry count u32
//! Entry:    ctime s+ns | mtime s+ns | dev | ino | mode | uid | gid | size
//!           (10 x u32) | 20-byte oid | flags u16 | path bytes | NUL padding
//! Trailer:  SHA-1 of everything preceding
//! ```
//!
//! The low 12 bits of `flags` carry the path length, capped at 0xFFF.
//! Padding after the path brings the path field to a multiple of eight
//! bytes, so the amount depends on the running offset, not just the entry.

use crate::{ObjectDatabase, OdbError, Result, GIT_DIR};
use keel_core::{EntryMode, ObjectId};
use keel_storage::{Storage, StorageError};
use sha1::{Digest, Sha1};

const SIGNATURE: &[u8; 4] = b"DIRC";
const VERSION: u32 = 2;
const HEADER_SIZE: usize = 12;
const ENTRY_FIXED_SIZE: usize = 62;
const CHECKSUM_SIZE: usize = 20;
const NAME_LENGTH_MASK: u16 = 0x0FFF;

/// One staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// Id of the staged blob.
    pub id: ObjectId,
    /// File mode.
    pub mode: EntryMode,
    /// File size in bytes.
    pub size: u32,
    /// Modification time, milliseconds since the Unix epoch.
    pub mtime_ms: u64,
}

/// The staging area. Entries are kept sorted by path and unique.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entries, sorted by path.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by path.
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Inserts an entry, replacing any existing entry at the same path.
    pub fn add_entry(&mut self, entry: IndexEntry) {
        match self
            .entries
            .binary_search_by(|e| e.path.as_str().cmp(&entry.path))
        {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Removes the entry at `path`, returning true if one was present.
    pub fn remove_entry(&mut self, path: &str) -> bool {
        match self.entries.binary_search_by(|e| e.path.as_str().cmp(path)) {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serializes to the DIRC binary format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.entries.len() * 80);
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for entry in &self.entries {
            let start = out.len();
            let secs = (entry.mtime_ms / 1000) as u32;
            let nanos = ((entry.mtime_ms % 1000) * 1_000_000) as u32;

            // ctime mirrors mtime; dev/ino/uid/gid are not tracked.
            for field in [
                secs,
                nanos,
                secs,
                nanos,
                0,
                0,
                entry.mode.as_u32(),
                0,
                0,
                entry.size,
            ] {
                out.extend_from_slice(&field.to_be_bytes());
            }
            out.extend_from_slice(entry.id.as_bytes());

            let flags = entry.path.len().min(NAME_LENGTH_MASK as usize) as u16;
            out.extend_from_slice(&flags.to_be_bytes());
            out.extend_from_slice(entry.path.as_bytes());

            while (out.len() - start - ENTRY_FIXED_SIZE) % 8 != 0 {
                out.push(0);
            }
        }

        let mut hasher = Sha1::new();
        hasher.update(&out);
        let checksum = hasher.finalize();
        out.extend_from_slice(&checksum);
        out
    }

    /// Parses the DIRC binary format.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(OdbError::Corrupt("index file too small".into()));
        }
        if &data[..4] != SIGNATURE {
            return Err(OdbError::Corrupt("index missing DIRC signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != VERSION {
            return Err(OdbError::Corrupt(format!(
                "unsupported index version: {}",
                version
            )));
        }
        let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;

        let body_end = data.len() - CHECKSUM_SIZE;
        let mut hasher = Sha1::new();
        hasher.update(&data[..body_end]);
        if hasher.finalize().as_slice() != &data[body_end..] {
            return Err(OdbError::Corrupt("index checksum mismatch".into()));
        }

        let mut entries = Vec::with_capacity(count);
        let mut pos = HEADER_SIZE;
        for _ in 0..count {
            let start = pos;
            if start + ENTRY_FIXED_SIZE > body_end {
                return Err(OdbError::Corrupt("index entry truncated".into()));
            }

            let u32_at = |off: usize| {
                u32::from_be_bytes([
                    data[start + off],
                    data[start + off + 1],
                    data[start + off + 2],
                    data[start + off + 3],
                ])
            };
            let mtime_s = u32_at(8);
            let mtime_ns = u32_at(12);
            let mode = EntryMode::from_u32(u32_at(24))?;
            let size = u32_at(36);
            let id = ObjectId::from_slice(&data[start + 40..start + 60])?;
            let flags = u16::from_be_bytes([data[start + 60], data[start + 61]]);

            let name_len = (flags & NAME_LENGTH_MASK) as usize;
            let name_start = start + ENTRY_FIXED_SIZE;
            let name_end = if name_len < NAME_LENGTH_MASK as usize {
                name_start + name_len
            } else {
                // Overlong path: length is capped, scan for the terminator.
                name_start
                    + data[name_start..body_end]
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or_else(|| OdbError::Corrupt("index path unterminated".into()))?
            };
            if name_end > body_end {
                return Err(OdbError::Corrupt("index entry truncated".into()));
            }
            let path = std::str::from_utf8(&data[name_start..name_end])
                .map_err(|_| OdbError::Corrupt("index path is not UTF-8".into()))?
                .to_string();

            pos = name_end;
            while (pos - start - ENTRY_FIXED_SIZE) % 8 != 0 {
                if pos >= body_end || data[pos] != 0 {
                    return Err(OdbError::Corrupt("index entry bad padding".into()));
                }
                pos += 1;
            }

            entries.push(IndexEntry {
                path,
                id,
                mode,
                size,
                mtime_ms: u64::from(mtime_s) * 1000 + u64::from(mtime_ns) / 1_000_000,
            });
        }

        let mut index = Self { entries };
        index.entries.sort_by(|a, b| a.path.cmp(&b.path));
        index.entries.dedup_by(|a, b| a.path == b.path);
        Ok(index)
    }

    /// Loads the index from storage. A missing file is an empty index.
    pub fn load<S: Storage>(storage: &S) -> Result<Self> {
        match storage.read_file(&format!("{}/index", GIT_DIR)) {
            Ok(bytes) => Self::parse(&bytes),
            Err(StorageError::NotFound(_)) => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists the index to storage.
    pub fn save<S: Storage>(&self, storage: &S) -> Result<()> {
        storage.write_file(&format!("{}/index", GIT_DIR), &self.serialize())?;
        Ok(())
    }

    /// Replaces the entries with the contents of a tree, recursing into
    /// subtrees and copying each leaf's mode verbatim.
    pub fn update_from_tree<S: Storage>(
        &mut self,
        odb: &ObjectDatabase<S>,
        tree_id: &ObjectId,
    ) -> Result<()> {
        self.entries.clear();
        self.collect_tree(odb, tree_id, "")?;
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(())
    }

    fn collect_tree<S: Storage>(
        &mut self,
        odb: &ObjectDatabase<S>,
        tree_id: &ObjectId,
        prefix: &str,
    ) -> Result<()> {
        let tree = odb.read_tree(tree_id)?;
        for entry in tree.entries() {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", prefix, entry.name)
            };
            if entry.mode.is_tree() {
                self.collect_tree(odb, &entry.id, &path)?;
            } else {
                let size = odb.read(&entry.id).map(|o| o.size() as u32).unwrap_or(0);
                self.entries.push(IndexEntry {
                    path,
                    id: entry.id,
                    mode: entry.mode,
                    size,
                    mtime_ms: 0,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{ObjectKind, Tree, TreeEntry};
    use keel_storage::MemoryStorage;
    use std::sync::Arc;

    fn blob_id(content: &[u8]) -> ObjectId {
        ObjectId::hash_object(ObjectKind::Blob, content)
    }

    fn entry(path: &str, content: &[u8]) -> IndexEntry {
        IndexEntry {
            path: path.to_string(),
            id: blob_id(content),
            mode: EntryMode::Regular,
            size: content.len() as u32,
            mtime_ms: 1_700_000_000_123,
        }
    }

    #[test]
    fn roundtrip() {
        let mut index = Index::new();
        index.add_entry(entry("src/main.rs", b"fn main() {}"));
        index.add_entry(entry("README.md", b"# readme"));

        let bytes = index.serialize();
        let parsed = Index::parse(&bytes).unwrap();
        assert_eq!(parsed.entries(), index.entries());
    }

    #[test]
    fn entries_stay_sorted_and_unique() {
        let mut index = Index::new();
        index.add_entry(entry("b.txt", b"1"));
        index.add_entry(entry("a.txt", b"2"));
        index.add_entry(entry("c.txt", b"3"));
        index.add_entry(entry("b.txt", b"replaced"));

        let paths: Vec<&str> = index.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(index.get("b.txt").unwrap().id, blob_id(b"replaced"));
    }

    #[test]
    fn one_byte_path_padding() {
        let mut index = Index::new();
        index.add_entry(entry("a", b"x"));
        let bytes = index.serialize();

        // Fixed part is 62 bytes, one name byte lands at offset 62 within
        // the entry, then seven NULs pad the name field to eight bytes.
        let entry_start = 12;
        let name_offset = entry_start + 62;
        assert_eq!(bytes[name_offset], b'a');
        assert_eq!(&bytes[name_offset + 1..name_offset + 8], &[0u8; 7]);
        // Header + 70-byte entry + 20-byte trailer.
        assert_eq!(bytes.len(), 12 + 70 + 20);

        let parsed = Index::parse(&bytes).unwrap();
        assert_eq!(parsed.entries()[0].path, "a");
    }

    #[test]
    fn eight_byte_path_needs_no_padding() {
        let mut index = Index::new();
        index.add_entry(entry("12345678", b"x"));
        let bytes = index.serialize();
        assert_eq!(bytes.len(), 12 + 62 + 8 + 20);
        assert_eq!(Index::parse(&bytes).unwrap().entries()[0].path, "12345678");
    }

    #[test]
    fn remove_entry() {
        let mut index = Index::new();
        index.add_entry(entry("a", b"1"));
        assert!(index.remove_entry("a"));
        assert!(!index.remove_entry("a"));
        assert!(index.is_empty());
    }

    #[test]
    fn corrupt_signature_and_checksum() {
        let mut index = Index::new();
        index.add_entry(entry("file", b"data"));
        let bytes = index.serialize();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            Index::parse(&bad_magic),
            Err(OdbError::Corrupt(_))
        ));

        let mut bad_sum = bytes;
        let last = bad_sum.len() - 1;
        bad_sum[last] ^= 0xFF;
        assert!(matches!(Index::parse(&bad_sum), Err(OdbError::Corrupt(_))));
    }

    #[test]
    fn missing_file_loads_empty() {
        let storage = MemoryStorage::new();
        let index = Index::load(&storage).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn save_load_roundtrip() {
        let storage = MemoryStorage::new();
        let mut index = Index::new();
        index.add_entry(entry("dir/file.txt", b"content"));
        index.save(&storage).unwrap();

        let loaded = Index::load(&storage).unwrap();
        assert_eq!(loaded.entries(), index.entries());
    }

    #[test]
    fn update_from_tree_walks_subtrees() {
        let storage = Arc::new(MemoryStorage::new());
        let odb = ObjectDatabase::new(storage);

        let blob_a = odb.write(ObjectKind::Blob, b"alpha").unwrap();
        let blob_b = odb.write(ObjectKind::Blob, b"beta").unwrap();

        let mut subtree = Tree::new();
        subtree.push(TreeEntry {
            mode: EntryMode::Executable,
            name: "run.sh".into(),
            id: blob_b,
        });
        let subtree_id = odb.write_tree(&subtree).unwrap();

        let mut root = Tree::new();
        root.push(TreeEntry {
            mode: EntryMode::Regular,
            name: "a.txt".into(),
            id: blob_a,
        });
        root.push(TreeEntry {
            mode: EntryMode::Directory,
            name: "bin".into(),
            id: subtree_id,
        });
        let root_id = odb.write_tree(&root).unwrap();

        let mut index = Index::new();
        index.add_entry(entry("stale", b"old"));
        index.update_from_tree(&odb, &root_id).unwrap();

        let paths: Vec<&str> = index.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "bin/run.sh"]);
        assert_eq!(index.get("bin/run.sh").unwrap().mode, EntryMode::Executable);
        assert_eq!(index.get("a.txt").unwrap().size, 5);
    }
}
