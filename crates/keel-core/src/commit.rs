//! Commit and tag text codecs.

use crate::{CoreError, ObjectId, ObjectKind, Result};
use std::fmt;

/// An author or committer line: name, email, and a timestamp with zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Person name.
    pub name: String,
    /// Email address, without the angle brackets.
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Timezone offset, e.g. `+0000`.
    pub tz: String,
}

impl Signature {
    /// Creates a signature.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: i64,
        tz: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz: tz.into(),
        }
    }

    /// Parses `Name <email> 1234567890 +0000`.
    pub fn parse(line: &str) -> Result<Self> {
        let open = line
            .find('<')
            .ok_or_else(|| CoreError::Corrupt("signature missing '<'".into()))?;
        let close = line
            .find('>')
            .ok_or_else(|| CoreError::Corrupt("signature missing '>'".into()))?;
        if close < open {
            return Err(CoreError::Corrupt("malformed signature".into()));
        }

        let name = line[..open].trim_end().to_string();
        let email = line[open + 1..close].to_string();

        let rest = line[close + 1..].trim();
        let mut parts = rest.split(' ');
        let timestamp = parts
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| CoreError::Corrupt("signature missing timestamp".into()))?;
        let tz = parts.next().unwrap_or("+0000").to_string();

        Ok(Self {
            name,
            email,
            timestamp,
            tz,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.tz
        )
    }
}

/// A parsed commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Id of the root tree.
    pub tree: ObjectId,
    /// Parent commit ids, first parent first.
    pub parents: Vec<ObjectId>,
    /// Author line.
    pub author: Signature,
    /// Committer line.
    pub committer: Signature,
    /// Commit message.
    pub message: String,
}

impl Commit {
    /// Parses a commit payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| CoreError::Corrupt("commit is not UTF-8".into()))?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        let mut lines = text.lines();
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Some(ObjectId::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                parents.push(ObjectId::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("author ") {
                author = Some(Signature::parse(rest)?);
            } else if let Some(rest) = line.strip_prefix("committer ") {
                committer = Some(Signature::parse(rest)?);
            }
            // Unknown headers (gpgsig etc.) are skipped.
        }

        let message: String = lines.collect::<Vec<_>>().join("\n");

        Ok(Self {
            tree: tree.ok_or_else(|| CoreError::Corrupt("commit missing tree header".into()))?,
            parents,
            author: author
                .ok_or_else(|| CoreError::Corrupt("commit missing author header".into()))?,
            committer: committer
                .ok_or_else(|| CoreError::Corrupt("commit missing committer header".into()))?,
            message,
        })
    }

    /// Serializes the commit payload.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::with_capacity(256 + self.message.len());
        out.push_str(&format!("tree {}\n", self.tree));
        for parent in &self.parents {
            out.push_str(&format!("parent {}\n", parent));
        }
        out.push_str(&format!("author {}\n", self.author));
        out.push_str(&format!("committer {}\n", self.committer));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// Computes the id this commit serializes to.
    pub fn id(&self) -> ObjectId {
        ObjectId::hash_object(ObjectKind::Commit, &self.serialize())
    }
}

/// A parsed annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Id of the tagged object.
    pub object: ObjectId,
    /// Kind of the tagged object.
    pub kind: ObjectKind,
    /// Tag name.
    pub name: String,
    /// Tagger line, when present.
    pub tagger: Option<Signature>,
    /// Tag message.
    pub message: String,
}

impl Tag {
    /// Parses a tag payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text =
            std::str::from_utf8(data).map_err(|_| CoreError::Corrupt("tag is not UTF-8".into()))?;

        let mut object = None;
        let mut kind = None;
        let mut name = None;
        let mut tagger = None;

        let mut lines = text.lines();
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("object ") {
                object = Some(ObjectId::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("type ") {
                kind = Some(ObjectKind::parse(rest)?);
            } else if let Some(rest) = line.strip_prefix("tag ") {
                name = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("tagger ") {
                tagger = Some(Signature::parse(rest)?);
            }
        }

        let message: String = lines.collect::<Vec<_>>().join("\n");

        Ok(Self {
            object: object.ok_or_else(|| CoreError::Corrupt("tag missing object header".into()))?,
            kind: kind.ok_or_else(|| CoreError::Corrupt("tag missing type header".into()))?,
            name: name.ok_or_else(|| CoreError::Corrupt("tag missing tag header".into()))?,
            tagger,
            message,
        })
    }

    /// Serializes the tag payload.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::with_capacity(256 + self.message.len());
        out.push_str(&format!("object {}\n", self.object));
        out.push_str(&format!("type {}\n", self.kind));
        out.push_str(&format!("tag {}\n", self.name));
        if let Some(tagger) = &self.tagger {
            out.push_str(&format!("tagger {}\n", tagger));
        }
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }
}
