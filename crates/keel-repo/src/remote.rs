//! Remote workflows: clone, fetch, and push over a pluggable transport.
//!
//! The transport is a trait so the same workflows drive the HTTP client and
//! in-process test doubles. Graph-side logic lives here; the wire-side byte
//! codecs live in keel-protocol.

use crate::repository::Repository;
use crate::{RepoError, Result};
use keel_core::{AbortSignal, ObjectId, ObjectKind};
use keel_odb::Head;
use keel_pack::{parse_pack, write_pack};
use keel_protocol::{Advertisement, RefUpdate, ReportStatus, Service};
use keel_storage::Storage;
use std::collections::HashSet;

/// A smart-HTTP peer, from the client's point of view.
pub trait Transport {
    /// Fetches and parses the `info/refs` advertisement.
    fn discover_refs(&self, service: Service) -> Result<Advertisement>;

    /// Posts an upload-pack request and returns the reassembled pack bytes.
    fn fetch_pack(&self, wants: &[ObjectId], haves: &[ObjectId]) -> Result<Vec<u8>>;

    /// Posts a receive-pack request and returns the status report.
    fn send_pack(&self, updates: &[RefUpdate], pack: &[u8]) -> Result<ReportStatus>;
}

impl<S: Storage> Repository<S> {
    /// Populates a freshly initialized repository from a remote: requests
    /// the HEAD commit, ingests the pack, mirrors every advertised ref, and
    /// checks out the matching branch.
    pub fn clone_from<T: Transport>(&self, transport: &T, remote: &str) -> Result<()> {
        let adv = transport.discover_refs(Service::UploadPack)?;
        if adv.is_empty() {
            tracing::info!("cloned an empty repository");
            return Ok(());
        }

        let head_id = adv
            .head()
            .or_else(|| adv.branches().next().map(|(_, id)| id))
            .ok_or_else(|| RepoError::Corrupt("advertisement carries no usable tip".into()))?;

        let pack = transport.fetch_pack(&[head_id], &[])?;
        parse_pack(&pack, self.objects(), &AbortSignal::new())?;

        let mut head_branch: Option<String> = None;
        for (branch, id) in adv.branches() {
            self.refs().write(&format!("refs/heads/{}", branch), &id)?;
            self.refs()
                .write(&format!("refs/remotes/{}/{}", remote, branch), &id)?;
            if id == head_id && (head_branch.is_none() || branch == "main") {
                head_branch = Some(branch.to_string());
            }
        }
        for (name, id) in &adv.refs {
            if let Some(tag) = name.strip_prefix("refs/tags/") {
                // Tag objects may not be in the pack; mirror the ref only
                // when the object arrived.
                if self.objects().has(id)? {
                    self.refs().write(&format!("refs/tags/{}", tag), id)?;
                }
            }
        }

        let branch = head_branch.unwrap_or_else(|| "main".to_string());
        self.refs()
            .write_head(&Head::Symbolic(format!("refs/heads/{}", branch)))?;
        if self.objects().has(&head_id)? {
            self.reset(&head_id.to_hex(), false)?;
        }

        tracing::info!(branch = %branch, head = %head_id, "cloned");
        Ok(())
    }

    /// Updates remote-tracking refs: wants every advertised branch whose
    /// oid differs from our mirror (tags excluded), offers our mirrored
    /// oids as haves.
    pub fn fetch_from<T: Transport>(&self, transport: &T, remote: &str) -> Result<()> {
        let adv = transport.discover_refs(Service::UploadPack)?;

        let mut wants = Vec::new();
        let mut haves = Vec::new();
        for (branch, id) in adv.branches() {
            let tracking = format!("refs/remotes/{}/{}", remote, branch);
            match self.refs().read(&tracking)? {
                Some(mirrored) if mirrored == id => {}
                other => {
                    wants.push(id);
                    if let Some(mirrored) = other {
                        haves.push(mirrored);
                    }
                }
            }
        }

        if wants.is_empty() {
            tracing::info!(remote = %remote, "already up to date");
            return Ok(());
        }

        let pack = transport.fetch_pack(&wants, &haves)?;
        if !pack.is_empty() {
            parse_pack(&pack, self.objects(), &AbortSignal::new())?;
        }

        for (branch, id) in adv.branches() {
            self.refs()
                .write(&format!("refs/remotes/{}/{}", remote, branch), &id)?;
        }

        tracing::info!(remote = %remote, heads = wants.len(), "fetched");
        Ok(())
    }

    /// Pushes a branch: collects the commit/tree/blob closure, sends it
    /// with a ref-update command, and advances the remote-tracking ref on
    /// success. Refuses non-fast-forward updates unless forced.
    pub fn push_to<T: Transport>(
        &self,
        transport: &T,
        remote: &str,
        branch: &str,
        force: bool,
    ) -> Result<ObjectId> {
        let local_ref = format!("refs/heads/{}", branch);
        let local_id = self
            .refs()
            .read(&local_ref)?
            .ok_or_else(|| RepoError::BranchNotFound(branch.to_string()))?;

        let adv = transport.discover_refs(Service::ReceivePack)?;
        let advertised = adv.get(&local_ref);
        if advertised == Some(local_id) {
            tracing::info!(branch = %branch, "remote already up to date");
            return Ok(local_id);
        }

        let tracking = format!("refs/remotes/{}/{}", remote, branch);
        let expected_old = self.refs().read(&tracking)?.unwrap_or(ObjectId::ZERO);
        let remote_old = advertised.unwrap_or(ObjectId::ZERO);
        if !force && remote_old != expected_old {
            return Err(RepoError::NonFastForward(local_ref));
        }

        // Boundary: anything the remote advertises and we hold locally is
        // already on the other side.
        let mut boundary: Vec<ObjectId> = Vec::new();
        for (_, id) in &adv.refs {
            if self.objects().has(id)? {
                boundary.push(*id);
            }
        }

        let objects = self.collect_push_closure(local_id, &boundary)?;
        let pack = write_pack(&objects, self.objects())?;

        let update = RefUpdate {
            old: remote_old,
            new: local_id,
            name: local_ref.clone(),
        };
        let report = transport.send_pack(&[update], &pack)?;
        if !report.is_ok() {
            let detail = report
                .refs
                .iter()
                .find_map(|(name, err)| err.as_ref().map(|e| format!("{}: {}", name, e)))
                .unwrap_or_else(|| "unpack failed".to_string());
            return Err(RepoError::Transport(format!("push rejected: {}", detail)));
        }

        self.refs().write(&tracking, &local_id)?;
        tracing::info!(branch = %branch, objects = objects.len(), "pushed");
        Ok(local_id)
    }

    /// Collects the transitive closure for a push, parents before children,
    /// stopping at commits the remote already has. A missing object is
    /// repository corruption, not a lookup miss.
    fn collect_push_closure(
        &self,
        tip: ObjectId,
        boundary: &[ObjectId],
    ) -> Result<Vec<ObjectId>> {
        let stop: HashSet<&ObjectId> = boundary.iter().collect();

        // Commit chain, newest first, then reversed so parents come first.
        let mut commits: Vec<ObjectId> = Vec::new();
        let mut queue: Vec<ObjectId> = vec![tip];
        let mut seen: HashSet<ObjectId> = HashSet::new();
        while let Some(id) = queue.pop() {
            if stop.contains(&id) || !seen.insert(id) {
                continue;
            }
            let commit = self
                .objects()
                .read_commit(&id)
                .map_err(|e| RepoError::Corrupt(e.to_string()))?;
            commits.push(id);
            queue.extend(commit.parents.iter().copied());
        }
        commits.reverse();

        let mut objects: Vec<ObjectId> = Vec::new();
        let mut included: HashSet<ObjectId> = HashSet::new();
        for commit_id in commits {
            let commit = self.objects().read_commit(&commit_id)?;
            self.collect_tree_closure(&commit.tree, &mut included, &mut objects)?;
            if included.insert(commit_id) {
                objects.push(commit_id);
            }
        }
        Ok(objects)
    }

    fn collect_tree_closure(
        &self,
        tree_id: &ObjectId,
        included: &mut HashSet<ObjectId>,
        objects: &mut Vec<ObjectId>,
    ) -> Result<()> {
        if !included.insert(*tree_id) {
            return Ok(());
        }
        let tree = self
            .objects()
            .read_tree(tree_id)
            .map_err(|e| RepoError::Corrupt(e.to_string()))?;
        for entry in tree.entries() {
            if entry.mode.is_tree() {
                self.collect_tree_closure(&entry.id, included, objects)?;
            } else if included.insert(entry.id) {
                if !self.objects().has(&entry.id)? {
                    return Err(RepoError::Corrupt(format!(
                        "object {} missing from closure",
                        entry.id
                    )));
                }
                objects.push(entry.id);
            }
        }
        objects.push(*tree_id);
        Ok(())
    }
}

/// Validates and splits a remote URL into `(base, repo)` parts. Only
/// http(s) URLs are accepted.
pub fn parse_remote_url(url: &str) -> Result<(String, String)> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| RepoError::InvalidInput(format!("unsupported URL: {}", url)))?;

    let (host, path) = rest
        .split_once('/')
        .ok_or_else(|| RepoError::InvalidInput(format!("URL has no repository path: {}", url)))?;
    let repo = path.trim_matches('/');
    if host.is_empty() || repo.is_empty() {
        return Err(RepoError::InvalidInput(format!("malformed URL: {}", url)));
    }

    let scheme_len = url.len() - rest.len();
    Ok((
        format!("{}{}", &url[..scheme_len], host),
        repo.trim_end_matches(".git").to_string(),
    ))
}
