//! Binary tree object codec.
//!
//! A tree is a sequence of `<mode> SP <name> NUL <20-byte id>` entries,
//! sorted lexicographically by name. The ordering is load-bearing: it is
//! what makes tree ids deterministic.

use crate::{CoreError, ObjectId, Result};

/// File mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file (`100644`).
    Regular,
    /// Executable file (`100755`).
    Executable,
    /// Symbolic link (`120000`).
    Symlink,
    /// Subtree (`40000`).
    Directory,
}

impl EntryMode {
    /// Returns the ASCII mode string used in tree serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Directory => "40000",
        }
    }

    /// Parses a mode string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "100644" => Ok(Self::Regular),
            "100755" => Ok(Self::Executable),
            "120000" => Ok(Self::Symlink),
            "40000" | "040000" => Ok(Self::Directory),
            _ => Err(CoreError::Corrupt(format!("unknown entry mode: {}", s))),
        }
    }

    /// Returns the numeric mode stored in index entries.
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
        }
    }

    /// Parses the numeric mode stored in index entries.
    pub fn from_u32(mode: u32) -> Result<Self> {
        match mode {
            0o100644 => Ok(Self::Regular),
            0o100755 => Ok(Self::Executable),
            0o120000 => Ok(Self::Symlink),
            0o040000 => Ok(Self::Directory),
            _ => Err(CoreError::Corrupt(format!("unknown entry mode: {:o}", mode))),
        }
    }

    /// Returns true for subtree entries.
    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry mode.
    pub mode: EntryMode,
    /// Entry name (a single path component).
    pub name: String,
    /// Id of the referenced blob or subtree.
    pub id: ObjectId,
}

/// A parsed tree object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree from entries; ordering is normalized on serialize.
    pub fn from_entries(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    /// Returns the entries in their current order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Adds an entry.
    pub fn push(&mut self, entry: TreeEntry) {
        self.entries.push(entry);
    }

    /// Looks up an entry by name.
    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Parses a binary tree payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let space = data[pos..]
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| CoreError::Corrupt("tree entry missing mode".into()))?;
            let mode = std::str::from_utf8(&data[pos..pos + space])
                .map_err(|_| CoreError::Corrupt("tree mode is not ASCII".into()))?;
            let mode = EntryMode::parse(mode)?;
            pos += space + 1;

            let nul = data[pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| CoreError::Corrupt("tree entry missing name terminator".into()))?;
            let name = std::str::from_utf8(&data[pos..pos + nul])
                .map_err(|_| CoreError::Corrupt("tree name is not UTF-8".into()))?
                .to_string();
            pos += nul + 1;

            if pos + 20 > data.len() {
                return Err(CoreError::Corrupt("tree entry truncated".into()));
            }
            let id = ObjectId::from_slice(&data[pos..pos + 20])?;
            pos += 20;

            entries.push(TreeEntry { mode, name, id });
        }

        Ok(Self { entries })
    }

    /// Serializes the tree, sorting entries lexicographically by name.
    pub fn serialize(&self) -> Vec<u8> {
        let mut sorted: Vec<&TreeEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = Vec::with_capacity(self.entries.len() * 48);
        for entry in sorted {
            out.extend_from_slice(entry.mode.as_str().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }
}
