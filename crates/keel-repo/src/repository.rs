//! The repository facade.

use crate::history;
use crate::{RepoError, Result};
use keel_core::{Commit, EntryMode, ObjectId, ObjectKind, Signature, Tag};
use keel_merge::{merge_trees, MergeOutcome, MergeStrategy};
use keel_odb::{
    write_path_tree, Config, Head, Index, IndexEntry, ObjectDatabase, RefDatabase, GIT_DIR,
};
use keel_storage::Storage;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Options for creating a repository.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Branch HEAD points at after init.
    pub initial_branch: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            initial_branch: "main".to_string(),
        }
    }
}

/// A status report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Current branch, `None` when HEAD is detached.
    pub branch: Option<String>,
    /// Paths staged for the next commit.
    pub staged: Vec<String>,
    /// Working-tree modifications. Always empty: the core does not diff
    /// the working tree.
    pub modified: Vec<String>,
    /// Untracked paths. Always empty, as above.
    pub untracked: Vec<String>,
}

/// A repository: object database, refs, index, and config over one storage
/// backend. One instance owns its index; callers serialize access per
/// repository (the server wraps each repository in a mutex).
pub struct Repository<S: Storage> {
    storage: Arc<S>,
    objects: ObjectDatabase<S>,
    refs: RefDatabase<S>,
    index: Mutex<Index>,
    config: Mutex<Config>,
}

impl<S: Storage> Repository<S> {
    /// Opens an existing repository on `storage`.
    pub fn open(storage: S) -> Result<Self> {
        let storage = Arc::new(storage);
        let index = Index::load(storage.as_ref())?;
        let config = Config::load(storage.as_ref())?;
        Ok(Self {
            objects: ObjectDatabase::new(storage.clone()),
            refs: RefDatabase::new(storage.clone()),
            index: Mutex::new(index),
            config: Mutex::new(config),
            storage,
        })
    }

    /// Initializes a fresh repository on `storage`.
    pub fn init(storage: S, options: &RepoConfig) -> Result<Self> {
        let repo = Self::open(storage)?;
        for dir in [
            "hooks",
            "info",
            "objects/info",
            "objects/pack",
            "refs/heads",
            "refs/tags",
        ] {
            repo.storage
                .create_directory(&format!("{}/{}", GIT_DIR, dir))?;
        }
        repo.refs.write_head(&Head::Symbolic(format!(
            "refs/heads/{}",
            options.initial_branch
        )))?;

        {
            let mut config = repo.config.lock();
            config.set("core", "repositoryformatversion", "0");
            config.set("core", "bare", "false");
            config.save(repo.storage.as_ref())?;
        }
        repo.index.lock().save(repo.storage.as_ref())?;

        tracing::info!(branch = %options.initial_branch, "initialized repository");
        Ok(repo)
    }

    /// The object database.
    pub fn objects(&self) -> &ObjectDatabase<S> {
        &self.objects
    }

    /// The ref database.
    pub fn refs(&self) -> &RefDatabase<S> {
        &self.refs
    }

    /// The storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    // ---- staging ----------------------------------------------------------

    /// Stages file content at `path`.
    pub fn add(&self, path: &str, bytes: &[u8]) -> Result<ObjectId> {
        validate_path(path)?;
        let id = self.objects.write(ObjectKind::Blob, bytes)?;
        let mut index = self.index.lock();
        index.add_entry(IndexEntry {
            path: path.to_string(),
            id,
            mode: EntryMode::Regular,
            size: bytes.len() as u32,
            mtime_ms: now_millis(),
        });
        index.save(self.storage.as_ref())?;
        Ok(id)
    }

    /// Removes `path` from the index.
    pub fn remove(&self, path: &str) -> Result<()> {
        let mut index = self.index.lock();
        if !index.remove_entry(path) {
            return Err(RepoError::InvalidInput(format!(
                "pathspec '{}' did not match any staged file",
                path
            )));
        }
        index.save(self.storage.as_ref())?;
        Ok(())
    }

    /// Renames a staged path.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        validate_path(to)?;
        let mut index = self.index.lock();
        let entry = index
            .get(from)
            .cloned()
            .ok_or_else(|| {
                RepoError::InvalidInput(format!("pathspec '{}' did not match any staged file", from))
            })?;
        index.remove_entry(from);
        index.add_entry(IndexEntry {
            path: to.to_string(),
            ..entry
        });
        index.save(self.storage.as_ref())?;
        Ok(())
    }

    /// Restores a staged path to its HEAD-tree content.
    pub fn restore(&self, path: &str) -> Result<()> {
        let head = self
            .head_commit()?
            .ok_or_else(|| RepoError::InvalidInput("no commit to restore from".into()))?;
        let tree = self.objects.read_commit(&head)?.tree;
        let flattened = keel_odb::flatten_tree(&self.objects, &tree)?;
        let (mode, id) = flattened.get(path).ok_or_else(|| {
            RepoError::InvalidInput(format!("pathspec '{}' did not match HEAD", path))
        })?;

        let size = self.objects.read(id)?.size() as u32;
        let mut index = self.index.lock();
        index.add_entry(IndexEntry {
            path: path.to_string(),
            id: *id,
            mode: *mode,
            size,
            mtime_ms: now_millis(),
        });
        index.save(self.storage.as_ref())?;
        Ok(())
    }

    /// Returns the staged entries.
    pub fn staged_entries(&self) -> Vec<IndexEntry> {
        self.index.lock().entries().to_vec()
    }

    // ---- commits ----------------------------------------------------------

    /// Builds a tree from the index and commits it. The branch HEAD names
    /// moves to the new commit; a detached HEAD moves directly.
    pub fn commit(&self, message: &str, author: &Signature) -> Result<ObjectId> {
        let tree = self.write_index_tree()?;
        let parents: Vec<ObjectId> = self.head_commit()?.into_iter().collect();

        let commit = Commit {
            tree,
            parents,
            author: author.clone(),
            committer: author.clone(),
            message: message.to_string(),
        };
        let id = self.objects.write_commit(&commit)?;
        self.advance_head(&id)?;

        tracing::info!(commit = %id, "created commit");
        Ok(id)
    }

    fn write_index_tree(&self) -> Result<ObjectId> {
        let index = self.index.lock();
        let mut map: BTreeMap<String, (EntryMode, ObjectId)> = BTreeMap::new();
        for entry in index.entries() {
            map.insert(entry.path.clone(), (entry.mode, entry.id));
        }
        Ok(write_path_tree(&self.objects, &map)?)
    }

    fn advance_head(&self, id: &ObjectId) -> Result<()> {
        match self.refs.read_head()? {
            Head::Symbolic(target) => self.refs.write(&target, id)?,
            Head::Detached(_) => self.refs.write_head(&Head::Detached(*id))?,
        }
        Ok(())
    }

    /// The commit HEAD resolves to, `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<ObjectId>> {
        Ok(self.refs.resolve_head()?)
    }

    /// The current branch name, `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.refs.read_head()?.branch().map(str::to_string))
    }

    /// First-parent history from HEAD, newest first.
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<(ObjectId, Commit)>> {
        match self.head_commit()? {
            Some(head) => history::first_parent_log(&self.objects, head, limit),
            None => Ok(Vec::new()),
        }
    }

    /// The simplified status report: every index path counts as staged;
    /// working-tree diffing is out of scope.
    pub fn status(&self) -> Result<Status> {
        Ok(Status {
            branch: self.current_branch()?,
            staged: self
                .index
                .lock()
                .entries()
                .iter()
                .map(|e| e.path.clone())
                .collect(),
            modified: Vec::new(),
            untracked: Vec::new(),
        })
    }

    // ---- branches, tags, revisions ---------------------------------------

    /// Lists local branches as `(name, oid)`.
    pub fn branches(&self) -> Result<Vec<(String, ObjectId)>> {
        Ok(self
            .refs
            .list()?
            .into_iter()
            .filter_map(|(name, id)| {
                name.strip_prefix("refs/heads/")
                    .map(|b| (b.to_string(), id))
            })
            .collect())
    }

    /// Creates a branch at the current HEAD commit.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        validate_ref_component(name)?;
        let head = self
            .head_commit()?
            .ok_or_else(|| RepoError::InvalidInput("cannot branch before the first commit".into()))?;
        self.refs.write(&format!("refs/heads/{}", name), &head)?;
        Ok(())
    }

    /// Deletes a branch.
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        if self.current_branch()?.as_deref() == Some(name) {
            return Err(RepoError::InvalidInput(format!(
                "cannot delete the current branch '{}'",
                name
            )));
        }
        self.refs
            .delete(&format!("refs/heads/{}", name))
            .map_err(|_| RepoError::BranchNotFound(name.to_string()))
    }

    /// Switches HEAD to a branch and loads its tree into the index.
    pub fn checkout(&self, branch: &str) -> Result<()> {
        let ref_name = format!("refs/heads/{}", branch);
        let target = self
            .refs
            .read(&ref_name)?
            .ok_or_else(|| RepoError::BranchNotFound(branch.to_string()))?;

        self.refs.write_head(&Head::Symbolic(ref_name))?;
        self.load_tree_into_index(&target)?;
        Ok(())
    }

    /// Creates a tag at HEAD: lightweight without a message, annotated with.
    pub fn tag(&self, name: &str, message: Option<&str>, tagger: &Signature) -> Result<ObjectId> {
        validate_ref_component(name)?;
        let head = self
            .head_commit()?
            .ok_or_else(|| RepoError::InvalidInput("cannot tag before the first commit".into()))?;

        let target = match message {
            None => head,
            Some(message) => {
                let tag = Tag {
                    object: head,
                    kind: ObjectKind::Commit,
                    name: name.to_string(),
                    tagger: Some(tagger.clone()),
                    message: message.to_string(),
                };
                self.objects.write(ObjectKind::Tag, &tag.serialize())?
            }
        };
        self.refs.write(&format!("refs/tags/{}", name), &target)?;
        Ok(target)
    }

    /// Resolves a revision string: `HEAD`, a full ref, a branch, a tag
    /// (annotated tags peel to their target), or a full 40-hex oid.
    pub fn resolve_revision(&self, revision: &str) -> Result<ObjectId> {
        if revision == "HEAD" {
            return self
                .head_commit()?
                .ok_or_else(|| RepoError::UnknownRevision(revision.to_string()));
        }

        let candidates = [
            revision.to_string(),
            format!("refs/heads/{}", revision),
            format!("refs/tags/{}", revision),
            format!("refs/remotes/{}", revision),
        ];
        for name in &candidates {
            if let Some(id) = self.refs.read(name)? {
                return self.peel(id);
            }
        }

        if revision.len() == 40 {
            if let Ok(id) = ObjectId::from_hex(revision) {
                if self.objects.has(&id)? {
                    return Ok(id);
                }
            }
        }
        Err(RepoError::UnknownRevision(revision.to_string()))
    }

    fn peel(&self, id: ObjectId) -> Result<ObjectId> {
        let object = self.objects.read(&id)?;
        if object.kind == ObjectKind::Tag {
            let tag = Tag::parse(&object.data)?;
            return Ok(tag.object);
        }
        Ok(id)
    }

    /// Resets to a revision. A hard reset also moves the branch HEAD names;
    /// both variants reload the index from the target commit's tree.
    pub fn reset(&self, revision: &str, hard: bool) -> Result<ObjectId> {
        let target = self.resolve_revision(revision)?;
        if hard {
            self.advance_head(&target)?;
        }
        self.load_tree_into_index(&target)?;
        Ok(target)
    }

    fn load_tree_into_index(&self, commit_id: &ObjectId) -> Result<()> {
        let tree = self.objects.read_commit(commit_id)?.tree;
        let mut index = self.index.lock();
        index.update_from_tree(&self.objects, &tree)?;
        index.save(self.storage.as_ref())?;
        Ok(())
    }

    // ---- merge and rebase -------------------------------------------------

    /// Merges another revision into HEAD, committing the result with two
    /// parents. Conflicts surface as [`RepoError::Conflicts`].
    pub fn merge(
        &self,
        other: &str,
        strategy: MergeStrategy,
        author: &Signature,
    ) -> Result<ObjectId> {
        let other_id = self.resolve_revision(other)?;
        let head_id = self
            .head_commit()?
            .ok_or_else(|| RepoError::InvalidInput("cannot merge into an unborn branch".into()))?;

        if other_id == head_id {
            return Ok(head_id);
        }
        let base = history::merge_base(&self.objects, head_id, other_id)?;
        if base == Some(other_id) {
            tracing::info!(other = %other, "already up to date");
            return Ok(head_id);
        }

        let base_tree = match base {
            Some(id) => Some(self.objects.read_commit(&id)?.tree),
            None => None,
        };
        let our_tree = self.objects.read_commit(&head_id)?.tree;
        let their_tree = self.objects.read_commit(&other_id)?.tree;

        let outcome = merge_trees(
            &self.objects,
            base_tree.as_ref(),
            &our_tree,
            &their_tree,
            strategy,
        )?;
        let merged_tree = match outcome {
            MergeOutcome::Merged(id) => id,
            MergeOutcome::Conflicted(conflicts) => return Err(RepoError::Conflicts(conflicts)),
        };

        let branch = self.current_branch()?.unwrap_or_else(|| "HEAD".to_string());
        let commit = Commit {
            tree: merged_tree,
            parents: vec![head_id, other_id],
            author: author.clone(),
            committer: author.clone(),
            message: format!("Merge branch '{}' into {}", other, branch),
        };
        let id = self.objects.write_commit(&commit)?;
        self.advance_head(&id)?;
        self.load_tree_into_index(&id)?;

        tracing::info!(commit = %id, other = %other, "merged");
        Ok(id)
    }

    /// Replays the commits since the fork point onto another revision.
    /// Replayed commits are restamped to the current time, author and
    /// committer alike; name and email carry over but the original dates
    /// are lost. Known limitation of the replay.
    pub fn rebase(&self, onto: &str) -> Result<ObjectId> {
        let onto_id = self.resolve_revision(onto)?;
        let head_id = self
            .head_commit()?
            .ok_or_else(|| RepoError::InvalidInput("cannot rebase an unborn branch".into()))?;

        let fork = history::merge_base(&self.objects, head_id, onto_id)?;
        if fork == Some(onto_id) || head_id == onto_id {
            return Ok(head_id);
        }

        let replay = history::commits_since(&self.objects, head_id, fork)?;
        let mut new_parent = onto_id;
        let replayed_at = now_secs();

        for (_, commit) in replay {
            let old_parent_tree = match commit.parents.first() {
                Some(parent) => Some(self.objects.read_commit(parent)?.tree),
                None => None,
            };
            let new_parent_tree = self.objects.read_commit(&new_parent)?.tree;

            let outcome = merge_trees(
                &self.objects,
                old_parent_tree.as_ref(),
                &new_parent_tree,
                &commit.tree,
                MergeStrategy::Recursive,
            )?;
            let merged_tree = match outcome {
                MergeOutcome::Merged(id) => id,
                MergeOutcome::Conflicted(conflicts) => {
                    return Err(RepoError::Conflicts(conflicts))
                }
            };

            let replayed = Commit {
                tree: merged_tree,
                parents: vec![new_parent],
                author: Signature::new(
                    commit.author.name.clone(),
                    commit.author.email.clone(),
                    replayed_at,
                    "+0000",
                ),
                committer: Signature::new(
                    commit.committer.name.clone(),
                    commit.committer.email.clone(),
                    replayed_at,
                    "+0000",
                ),
                message: commit.message.clone(),
            };
            new_parent = self.objects.write_commit(&replayed)?;
        }

        self.advance_head(&new_parent)?;
        self.load_tree_into_index(&new_parent)?;

        tracing::info!(commit = %new_parent, onto = %onto, "rebased");
        Ok(new_parent)
    }

    // ---- config -----------------------------------------------------------

    /// Records a remote's URL in the config file.
    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        let mut config = self.config.lock();
        config.set_remote_url(name, url);
        config.save(self.storage.as_ref())?;
        Ok(())
    }

    /// Looks up a remote's URL.
    pub fn remote_url(&self, name: &str) -> Option<String> {
        self.config.lock().remote_url(name).map(str::to_string)
    }

    /// Lists configured remote names.
    pub fn remotes(&self) -> Vec<String> {
        self.config
            .lock()
            .sections_with_prefix("remote \"")
            .filter_map(|s| {
                s.strip_prefix("remote \"")
                    .and_then(|r| r.strip_suffix('"'))
                    .map(str::to_string)
            })
            .collect()
    }

    /// Reads a config value, e.g. the user identity.
    pub fn config_value(&self, section: &str, key: &str) -> Option<String> {
        self.config.lock().get(section, key).map(str::to_string)
    }

    /// Writes a config value.
    pub fn set_config_value(&self, section: &str, key: &str, value: &str) -> Result<()> {
        let mut config = self.config.lock();
        config.set(section, key, value);
        config.save(self.storage.as_ref())?;
        Ok(())
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path.split('/').any(|c| c.is_empty() || c == "." || c == "..")
    {
        return Err(RepoError::InvalidInput(format!("invalid path: {:?}", path)));
    }
    Ok(())
}

fn validate_ref_component(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains(' ')
        || name.contains("..")
        || name.starts_with('/')
        || name.ends_with('/')
    {
        return Err(RepoError::InvalidInput(format!(
            "invalid ref name: {:?}",
            name
        )));
    }
    Ok(())
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn now_secs() -> i64 {
    (now_millis() / 1000) as i64
}
