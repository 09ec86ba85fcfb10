//! The client facade.
//!
//! One instance wraps a repository rooted at a working directory on the
//! local filesystem. Staging reads file bytes from the working directory;
//! checkout-like operations write blobs back into it. Every subcommand of
//! the front-end maps onto exactly one method here.

use crate::transport::HttpTransport;
use crate::{ClientError, Result};
use keel_core::{Commit, ObjectId, Signature};
use keel_merge::MergeStrategy;
use keel_odb::IndexEntry;
use keel_repo::{RepoConfig, Repository, Status};
use keel_storage::{LocalStorage, Storage, StorageError};
use std::path::Path;

/// High-level operations over a working directory.
pub struct KeelClient {
    repo: Repository<LocalStorage>,
}

impl KeelClient {
    /// Initializes a new repository in `dir`.
    pub fn init(dir: impl AsRef<Path>) -> Result<Self> {
        let storage = LocalStorage::open(dir.as_ref())?;
        let repo = Repository::init(storage, &RepoConfig::default())?;
        Ok(Self { repo })
    }

    /// Opens the repository in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let storage = LocalStorage::open(dir.as_ref())?;
        if !storage.exists(".git/HEAD")? {
            return Err(ClientError::NotARepository(
                dir.as_ref().display().to_string(),
            ));
        }
        Ok(Self {
            repo: Repository::open(storage)?,
        })
    }

    /// Clones `url` into `dir` and checks out the remote HEAD branch.
    pub fn clone(url: &str, dir: impl AsRef<Path>) -> Result<Self> {
        let client = Self::init(&dir)?;
        let transport = HttpTransport::from_url(url)?;
        client.repo.add_remote("origin", url)?;
        client.repo.clone_from(&transport, "origin")?;
        client.materialize_worktree()?;
        Ok(client)
    }

    /// The underlying repository.
    pub fn repo(&self) -> &Repository<LocalStorage> {
        &self.repo
    }

    // ---- working tree and staging -----------------------------------------

    /// Stages a file from the working directory.
    pub fn add(&self, path: &str) -> Result<ObjectId> {
        let bytes = match self.repo.storage().read_file(path) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                return Err(ClientError::PathspecMismatch(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.repo.add(path, &bytes)?)
    }

    /// Unstages a file and removes it from the working directory.
    pub fn rm(&self, path: &str) -> Result<()> {
        self.repo.remove(path)?;
        match self.repo.storage().delete_file(path) {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Renames a file in the index and the working directory.
    pub fn mv(&self, from: &str, to: &str) -> Result<()> {
        self.repo.rename(from, to)?;
        match self.repo.storage().read_file(from) {
            Ok(bytes) => {
                self.repo.storage().write_file(to, &bytes)?;
                self.repo.storage().delete_file(from)?;
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Restores a file from HEAD into the index and working directory.
    pub fn restore(&self, path: &str) -> Result<()> {
        self.repo.restore(path)?;
        self.write_staged_file(path)
    }

    fn write_staged_file(&self, path: &str) -> Result<()> {
        if let Some(entry) = self.repo.staged_entries().iter().find(|e| e.path == path) {
            let blob = self.repo.objects().read(&entry.id)?;
            self.repo.storage().write_file(path, &blob.data)?;
        }
        Ok(())
    }

    /// Writes every staged blob back into the working directory.
    fn materialize_worktree(&self) -> Result<()> {
        for entry in self.repo.staged_entries() {
            let blob = self.repo.objects().read(&entry.id)?;
            self.repo.storage().write_file(&entry.path, &blob.data)?;
        }
        Ok(())
    }

    /// The staged entries.
    pub fn staged(&self) -> Vec<IndexEntry> {
        self.repo.staged_entries()
    }

    // ---- commits and history ----------------------------------------------

    /// Commits the index with the configured identity.
    pub fn commit(&self, message: &str) -> Result<ObjectId> {
        let author = self.identity();
        Ok(self.repo.commit(message, &author)?)
    }

    /// First-parent history from HEAD.
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<(ObjectId, Commit)>> {
        Ok(self.repo.log(limit)?)
    }

    /// Resolves and loads one commit.
    pub fn show(&self, revision: &str) -> Result<(ObjectId, Commit)> {
        let id = self.repo.resolve_revision(revision)?;
        Ok((id, self.repo.objects().read_commit(&id)?))
    }

    /// The status report.
    pub fn status(&self) -> Result<Status> {
        Ok(self.repo.status()?)
    }

    // ---- branches and tags ------------------------------------------------

    /// Lists branches with the current one flagged.
    pub fn branches(&self) -> Result<Vec<(String, ObjectId, bool)>> {
        let current = self.repo.current_branch()?;
        Ok(self
            .repo
            .branches()?
            .into_iter()
            .map(|(name, id)| {
                let is_current = Some(name.as_str()) == current.as_deref();
                (name, id, is_current)
            })
            .collect())
    }

    /// Creates a branch at HEAD.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        Ok(self.repo.create_branch(name)?)
    }

    /// Deletes a branch.
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        Ok(self.repo.delete_branch(name)?)
    }

    /// Switches to a branch and refreshes the working directory.
    pub fn switch(&self, branch: &str) -> Result<()> {
        self.repo.checkout(branch)?;
        self.materialize_worktree()
    }

    /// Creates a tag at HEAD; annotated when a message is given.
    pub fn tag(&self, name: &str, message: Option<&str>) -> Result<ObjectId> {
        let tagger = self.identity();
        Ok(self.repo.tag(name, message, &tagger)?)
    }

    /// Lists tags.
    pub fn tags(&self) -> Result<Vec<(String, ObjectId)>> {
        Ok(self
            .repo
            .refs()
            .list()?
            .into_iter()
            .filter_map(|(name, id)| {
                name.strip_prefix("refs/tags/").map(|t| (t.to_string(), id))
            })
            .collect())
    }

    // ---- merge, rebase, reset ---------------------------------------------

    /// Merges a revision into HEAD.
    pub fn merge(&self, revision: &str) -> Result<ObjectId> {
        let author = self.identity();
        let id = self
            .repo
            .merge(revision, MergeStrategy::Recursive, &author)?;
        self.materialize_worktree()?;
        Ok(id)
    }

    /// Rebases HEAD onto a revision.
    pub fn rebase(&self, revision: &str) -> Result<ObjectId> {
        let id = self.repo.rebase(revision)?;
        self.materialize_worktree()?;
        Ok(id)
    }

    /// Resets to a revision; hard resets also refresh the working tree.
    pub fn reset(&self, revision: &str, hard: bool) -> Result<ObjectId> {
        let id = self.repo.reset(revision, hard)?;
        if hard {
            self.materialize_worktree()?;
        }
        Ok(id)
    }

    // ---- remotes ----------------------------------------------------------

    /// Records a remote URL.
    pub fn remote_add(&self, name: &str, url: &str) -> Result<()> {
        Ok(self.repo.add_remote(name, url)?)
    }

    /// Lists remotes as `(name, url)`.
    pub fn remotes(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .repo
            .remotes()
            .into_iter()
            .filter_map(|name| self.repo.remote_url(&name).map(|url| (name, url)))
            .collect())
    }

    fn transport_for(&self, remote: &str) -> Result<HttpTransport> {
        let url = self
            .repo
            .remote_url(remote)
            .ok_or_else(|| ClientError::UnknownRemote(remote.to_string()))?;
        Ok(HttpTransport::from_url(&url)?)
    }

    /// Fetches a remote into its tracking refs.
    pub fn fetch(&self, remote: &str) -> Result<()> {
        let transport = self.transport_for(remote)?;
        Ok(self.repo.fetch_from(&transport, remote)?)
    }

    /// Fetches, then merges the current branch's remote counterpart.
    pub fn pull(&self, remote: &str) -> Result<ObjectId> {
        self.fetch(remote)?;
        let branch = self
            .repo
            .current_branch()?
            .ok_or_else(|| keel_repo::RepoError::InvalidInput("cannot pull onto a detached HEAD".into()))?;
        let id = self.merge(&format!("{}/{}", remote, branch))?;
        Ok(id)
    }

    /// Pushes a branch (the current one when `branch` is `None`).
    pub fn push(&self, remote: &str, branch: Option<&str>, force: bool) -> Result<ObjectId> {
        let branch = match branch {
            Some(branch) => branch.to_string(),
            None => self.repo.current_branch()?.ok_or_else(|| {
                keel_repo::RepoError::InvalidInput("cannot push a detached HEAD".into())
            })?,
        };
        let transport = self.transport_for(remote)?;
        Ok(self.repo.push_to(&transport, remote, &branch, force)?)
    }

    // ---- identity ---------------------------------------------------------

    /// The committer identity: config first, then environment, then a
    /// placeholder.
    fn identity(&self) -> Signature {
        let name = self
            .repo
            .config_value("user", "name")
            .or_else(|| std::env::var("KEEL_AUTHOR_NAME").ok())
            .unwrap_or_else(|| "Keel User".to_string());
        let email = self
            .repo
            .config_value("user", "email")
            .or_else(|| std::env::var("KEEL_AUTHOR_EMAIL").ok())
            .unwrap_or_else(|| "keel@localhost".to_string());

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Signature::new(name, email, now, "+0000")
    }

    /// Records the user identity in the repository config.
    pub fn set_identity(&self, name: &str, email: &str) -> Result<()> {
        self.repo.set_config_value("user", "name", name)?;
        self.repo.set_config_value("user", "email", email)?;
        Ok(())
    }
}
