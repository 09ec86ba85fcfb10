//! Repository config file.
//!
//! A minimal INI-style codec covering what the workflows need: the core
//! section written at init, remote URLs, and the user identity.
//!
//! ```text
//! [core]
//! \trepositoryformatversion = 0
//! [remote "origin"]
//! \turl = http://example.com/repo
//! ```

use crate::{Result, GIT_DIR};
use keel_storage::{Storage, StorageError};

/// Parsed repository configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Config {
    /// Creates an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a value. Section names are the full heading, e.g.
    /// `core` or `remote "origin"`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a value, creating the section if needed.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let at = match self.sections.iter().position(|s| s.name == section) {
            Some(at) => at,
            None => {
                self.sections.push(Section {
                    name: section.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        let section = &mut self.sections[at];
        match section.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => section.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Removes an entire section. Returns true if it existed.
    pub fn remove_section(&mut self, section: &str) -> bool {
        let before = self.sections.len();
        self.sections.retain(|s| s.name != section);
        self.sections.len() != before
    }

    /// Lists section names with the given prefix, e.g. `remote `.
    pub fn sections_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.sections
            .iter()
            .map(|s| s.name.as_str())
            .filter(move |n| n.starts_with(prefix))
    }

    /// Convenience accessor for a remote's URL.
    pub fn remote_url(&self, remote: &str) -> Option<&str> {
        self.get(&format!("remote \"{}\"", remote), "url")
    }

    /// Records a remote's URL.
    pub fn set_remote_url(&mut self, remote: &str, url: &str) {
        self.set(&format!("remote \"{}\"", remote), "url", url);
    }

    /// Parses config text.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::new();
        let mut current: Option<String> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                current = Some(line[1..line.len() - 1].trim().to_string());
            } else if let (Some(section), Some((key, value))) = (&current, line.split_once('=')) {
                config.set(section, key.trim(), value.trim());
            }
        }
        config
    }

    /// Serializes to config text.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&format!("[{}]\n", section.name));
            for (key, value) in &section.entries {
                out.push_str(&format!("\t{} = {}\n", key, value));
            }
        }
        out
    }

    /// Loads the config from storage; missing file is an empty config.
    pub fn load<S: Storage>(storage: &S) -> Result<Self> {
        match storage.read_file(&format!("{}/config", GIT_DIR)) {
            Ok(bytes) => Ok(Self::parse(&String::from_utf8_lossy(&bytes))),
            Err(StorageError::NotFound(_)) => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists the config to storage.
    pub fn save<S: Storage>(&self, storage: &S) -> Result<()> {
        storage.write_file(&format!("{}/config", GIT_DIR), self.serialize().as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_storage::MemoryStorage;

    #[test]
    fn roundtrip() {
        let mut config = Config::new();
        config.set("core", "repositoryformatversion", "0");
        config.set("core", "bare", "false");
        config.set_remote_url("origin", "http://localhost:8080/demo");

        let text = config.serialize();
        let parsed = Config::parse(&text);
        assert_eq!(parsed, config);
        assert_eq!(
            parsed.remote_url("origin"),
            Some("http://localhost:8080/demo")
        );
    }

    #[test]
    fn set_overwrites() {
        let mut config = Config::new();
        config.set("user", "name", "Alice");
        config.set("user", "name", "Bob");
        assert_eq!(config.get("user", "name"), Some("Bob"));
    }

    #[test]
    fn parse_ignores_comments_and_blanks() {
        let config = Config::parse("# comment\n\n[user]\n\tname = Carol\n; other\n");
        assert_eq!(config.get("user", "name"), Some("Carol"));
    }

    #[test]
    fn remote_sections_listed() {
        let mut config = Config::new();
        config.set_remote_url("origin", "http://a");
        config.set_remote_url("backup", "http://b");
        let remotes: Vec<&str> = config.sections_with_prefix("remote ").collect();
        assert_eq!(remotes.len(), 2);
    }

    #[test]
    fn storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert!(Config::load(&storage).unwrap().serialize().is_empty());

        let mut config = Config::new();
        config.set("core", "repositoryformatversion", "0");
        config.save(&storage).unwrap();
        assert_eq!(Config::load(&storage).unwrap(), config);
    }
}
