//! Git object kinds and the in-memory object representation.

use crate::{CoreError, ObjectId, Result};
use bytes::Bytes;

/// The four Git object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit object.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectKind {
    /// Returns the string used in loose-object headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parses an object kind from its header string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            _ => Err(CoreError::Corrupt(format!("unknown object kind: {}", s))),
        }
    }

    /// Returns the numeric type code used in pack entries.
    pub fn pack_type(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parses an object kind from a pack type code.
    ///
    /// Codes 6 (ofs-delta) and 7 (ref-delta) are pack-internal and rejected
    /// here; the pack reader models them separately.
    pub fn from_pack_type(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            _ => Err(CoreError::Corrupt(format!("unknown pack type: {}", code))),
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Git object: its id, kind, and raw payload.
#[derive(Debug, Clone)]
pub struct GitObject {
    /// The object's SHA-1 identifier.
    pub id: ObjectId,
    /// The kind of object.
    pub kind: ObjectKind,
    /// The raw object payload (uncompressed, header stripped).
    pub data: Bytes,
}

impl GitObject {
    /// Creates a new object, computing its id from the payload.
    pub fn new(kind: ObjectKind, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let id = ObjectId::hash_object(kind, &data);
        Self { id, kind, data }
    }

    /// Creates a blob object from file content.
    pub fn blob(content: impl Into<Bytes>) -> Self {
        Self::new(ObjectKind::Blob, content)
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_string_roundtrip() {
        for kind in [
            ObjectKind::Blob,
            ObjectKind::Tree,
            ObjectKind::Commit,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(ObjectKind::parse("bloob").is_err());
    }

    #[test]
    fn pack_type_roundtrip() {
        for kind in [
            ObjectKind::Commit,
            ObjectKind::Tree,
            ObjectKind::Blob,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_pack_type(kind.pack_type()).unwrap(), kind);
        }
        assert!(ObjectKind::from_pack_type(0).is_err());
        assert!(ObjectKind::from_pack_type(5).is_err());
        assert!(ObjectKind::from_pack_type(6).is_err());
        assert!(ObjectKind::from_pack_type(7).is_err());
    }

    #[test]
    fn blob_object() {
        let obj = GitObject::blob(b"hello\n".to_vec());
        assert_eq!(obj.kind, ObjectKind::Blob);
        assert_eq!(obj.size(), 6);
        assert_eq!(obj.id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn identical_payloads_share_an_id() {
        let a = GitObject::blob(b"same".to_vec());
        let b = GitObject::blob(b"same".to_vec());
        assert_eq!(a.id, b.id);
    }
}
