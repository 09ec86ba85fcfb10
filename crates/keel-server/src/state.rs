//! Shared server state: one repository actor per name.

use crate::ServerError;
use keel_repo::{RepoConfig, Repository};
use keel_storage::MemoryStorage;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A mutex-guarded repository. The mutex is the per-repository actor: only
/// one request at a time touches a repository's refs, index, or pack
/// ingestion; different repositories run in parallel.
pub type RepoHandle = Mutex<Repository<MemoryStorage>>;

/// All repositories hosted by this server, created on first push.
#[derive(Default)]
pub struct RepoStore {
    repos: RwLock<HashMap<String, Arc<RepoHandle>>>,
}

impl RepoStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an existing repository.
    pub fn get(&self, name: &str) -> Option<Arc<RepoHandle>> {
        self.repos.read().get(name).cloned()
    }

    /// Looks up a repository, creating it when absent (initial push).
    pub fn get_or_create(&self, name: &str) -> Result<Arc<RepoHandle>, ServerError> {
        if let Some(handle) = self.get(name) {
            return Ok(handle);
        }
        let mut repos = self.repos.write();
        if let Some(handle) = repos.get(name) {
            return Ok(handle.clone());
        }
        let repo = Repository::init(MemoryStorage::new(), &RepoConfig::default())
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let handle = Arc::new(Mutex::new(repo));
        repos.insert(name.to_string(), handle.clone());
        tracing::info!(repo = %name, "created repository");
        Ok(handle)
    }

    /// Lists hosted repository names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.repos.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// State shared across handlers.
#[derive(Clone, Default)]
pub struct AppState {
    /// Repository store.
    pub repos: Arc<RepoStore>,
}

impl AppState {
    /// Creates fresh state.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let store = RepoStore::new();
        assert!(store.get("demo").is_none());

        let first = store.get_or_create("demo").unwrap();
        let second = store.get_or_create("demo").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.list(), vec!["demo"]);
    }
}
