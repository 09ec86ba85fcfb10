//! Commit graph walks.
//!
//! Commit structs never reference each other directly; every walk is an
//! explicit work-list over an oid-keyed store with a visited set, so cycles
//! and diamonds in the graph cannot recurse unboundedly.

use crate::Result;
use keel_core::{Commit, ObjectId};
use keel_odb::ObjectDatabase;
use keel_storage::Storage;
use std::collections::HashSet;

/// Walks first-parent history from `start`, newest first, at most `limit`
/// commits when given.
pub fn first_parent_log<S: Storage>(
    odb: &ObjectDatabase<S>,
    start: ObjectId,
    limit: Option<usize>,
) -> Result<Vec<(ObjectId, Commit)>> {
    let mut out = Vec::new();
    let mut cursor = Some(start);
    let mut seen: HashSet<ObjectId> = HashSet::new();

    while let Some(id) = cursor {
        if !seen.insert(id) {
            break;
        }
        if limit.is_some_and(|l| out.len() >= l) {
            break;
        }
        let commit = odb.read_commit(&id)?;
        cursor = commit.parents.first().copied();
        out.push((id, commit));
    }
    Ok(out)
}

/// Returns the set of first-parent ancestors of `start`, including itself.
pub fn first_parent_ancestors<S: Storage>(
    odb: &ObjectDatabase<S>,
    start: ObjectId,
) -> Result<HashSet<ObjectId>> {
    let mut out = HashSet::new();
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        if !out.insert(id) {
            break;
        }
        cursor = odb.read_commit(&id)?.parents.first().copied();
    }
    Ok(out)
}

/// Finds the merge base of `ours` and `theirs` over first-parent history:
/// the first ancestor of `theirs` that is also an ancestor of `ours`.
/// Criss-cross histories fall back to whichever common ancestor is reached
/// first.
pub fn merge_base<S: Storage>(
    odb: &ObjectDatabase<S>,
    ours: ObjectId,
    theirs: ObjectId,
) -> Result<Option<ObjectId>> {
    let our_ancestors = first_parent_ancestors(odb, ours)?;
    let mut cursor = Some(theirs);
    let mut seen: HashSet<ObjectId> = HashSet::new();
    while let Some(id) = cursor {
        if our_ancestors.contains(&id) {
            return Ok(Some(id));
        }
        if !seen.insert(id) {
            break;
        }
        cursor = odb.read_commit(&id)?.parents.first().copied();
    }
    Ok(None)
}

/// Lists the commits on the first-parent chain from `head` back to (and
/// excluding) `fork`, oldest first. Used by rebase to replay work.
pub fn commits_since<S: Storage>(
    odb: &ObjectDatabase<S>,
    head: ObjectId,
    fork: Option<ObjectId>,
) -> Result<Vec<(ObjectId, Commit)>> {
    let mut out = Vec::new();
    let mut cursor = Some(head);
    while let Some(id) = cursor {
        if Some(id) == fork {
            break;
        }
        let commit = odb.read_commit(&id)?;
        cursor = commit.parents.first().copied();
        out.push((id, commit));
    }
    out.reverse();
    Ok(out)
}
