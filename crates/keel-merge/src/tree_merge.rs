//! Three-way tree merge.
//!
//! The union of paths across base, ours, and theirs is classified per path:
//!
//! | base | ours | theirs | outcome |
//! |------|------|--------|---------|
//! | any  | absent | absent | omit |
//! | any  | E      | absent | include E unless base == E |
//! | any  | absent | E      | symmetric |
//! | any  | U      | T, U == T | include U |
//! | absent | U    | T, U != T | conflict (both added) |
//! | B    | B      | T      | include T |
//! | B    | U      | B      | include U |
//! | B    | U      | T      | content merge, else conflict |

use crate::content::{is_binary, merge_content};
use crate::{MergeError, Result};
use keel_core::{EntryMode, ObjectId, ObjectKind};
use keel_odb::{flatten_tree, write_path_tree, ObjectDatabase};
use keel_storage::Storage;
use std::collections::{BTreeMap, BTreeSet};

/// Merge strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Structural rules plus line-level content merge.
    #[default]
    Recursive,
    /// Structural rules only; any both-modified path conflicts.
    Resolve,
    /// Take our tree unchanged.
    Ours,
    /// Take their tree unchanged.
    Theirs,
}

/// A path the merge could not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Path of the conflicting entry.
    pub path: String,
    /// Human-readable description of the disagreement.
    pub reason: String,
}

/// Result of a tree merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The merged tree id.
    Merged(ObjectId),
    /// A non-empty list of conflicts.
    Conflicted(Vec<Conflict>),
}

impl MergeOutcome {
    /// Returns the merged tree id, if the merge succeeded.
    pub fn merged(&self) -> Option<ObjectId> {
        match self {
            MergeOutcome::Merged(id) => Some(*id),
            MergeOutcome::Conflicted(_) => None,
        }
    }
}

/// Merges `ours` and `theirs` against `base`. A missing base (no common
/// ancestor) merges against the empty tree.
pub fn merge_trees<S: Storage>(
    odb: &ObjectDatabase<S>,
    base: Option<&ObjectId>,
    ours: &ObjectId,
    theirs: &ObjectId,
    strategy: MergeStrategy,
) -> Result<MergeOutcome> {
    match strategy {
        MergeStrategy::Ours => return Ok(MergeOutcome::Merged(*ours)),
        MergeStrategy::Theirs => return Ok(MergeOutcome::Merged(*theirs)),
        MergeStrategy::Recursive | MergeStrategy::Resolve => {}
    }

    let base_map = match base {
        Some(id) => flatten_tree(odb, id)?,
        None => BTreeMap::new(),
    };
    let our_map = flatten_tree(odb, ours)?;
    let their_map = flatten_tree(odb, theirs)?;

    let mut paths: BTreeSet<&String> = BTreeSet::new();
    paths.extend(base_map.keys());
    paths.extend(our_map.keys());
    paths.extend(their_map.keys());

    let mut merged: BTreeMap<String, (EntryMode, ObjectId)> = BTreeMap::new();
    let mut conflicts: Vec<Conflict> = Vec::new();

    for path in paths {
        let b = base_map.get(path);
        let o = our_map.get(path);
        let t = their_map.get(path);

        match (o, t) {
            (None, None) => {}
            (Some(entry), None) => {
                // They deleted. Keep ours only if we changed it since base.
                if b != Some(entry) {
                    merged.insert(path.clone(), *entry);
                }
            }
            (None, Some(entry)) => {
                if b != Some(entry) {
                    merged.insert(path.clone(), *entry);
                }
            }
            (Some(our_entry), Some(their_entry)) => {
                if our_entry == their_entry {
                    merged.insert(path.clone(), *our_entry);
                } else if b.is_none() {
                    conflicts.push(Conflict {
                        path: path.clone(),
                        reason: "added differently on both sides".into(),
                    });
                } else if b == Some(our_entry) {
                    merged.insert(path.clone(), *their_entry);
                } else if b == Some(their_entry) {
                    merged.insert(path.clone(), *our_entry);
                } else {
                    match (strategy, b) {
                        (MergeStrategy::Recursive, Some(base_entry)) => {
                            match merge_blobs(odb, base_entry, our_entry, their_entry)? {
                                Some(id) => {
                                    merged.insert(path.clone(), (our_entry.0, id));
                                }
                                None => conflicts.push(Conflict {
                                    path: path.clone(),
                                    reason: "content conflict".into(),
                                }),
                            }
                        }
                        _ => conflicts.push(Conflict {
                            path: path.clone(),
                            reason: "modified on both sides".into(),
                        }),
                    }
                }
            }
        }
    }

    if !conflicts.is_empty() {
        tracing::debug!(count = conflicts.len(), "merge produced conflicts");
        return Ok(MergeOutcome::Conflicted(conflicts));
    }

    Ok(MergeOutcome::Merged(write_path_tree(odb, &merged)?))
}

/// Attempts a line-level merge of one path, returning the merged blob id or
/// `None` when the contents conflict or either side is binary.
fn merge_blobs<S: Storage>(
    odb: &ObjectDatabase<S>,
    base: &(EntryMode, ObjectId),
    ours: &(EntryMode, ObjectId),
    theirs: &(EntryMode, ObjectId),
) -> Result<Option<ObjectId>> {
    let base_bytes = odb.read(&base.1)?.data;
    let our_bytes = odb.read(&ours.1)?.data;
    let their_bytes = odb.read(&theirs.1)?.data;

    if is_binary(&our_bytes) || is_binary(&their_bytes) {
        return Ok(None);
    }

    let (merged, conflicted) = merge_content(&base_bytes, &our_bytes, &their_bytes);
    if conflicted {
        return Ok(None);
    }
    Ok(Some(odb.write(ObjectKind::Blob, &merged)?))
}

/// Folds the recursive strategy left-to-right over three or more trees,
/// with the first tree as the shared base.
pub fn merge_octopus<S: Storage>(
    odb: &ObjectDatabase<S>,
    trees: &[ObjectId],
) -> Result<MergeOutcome> {
    if trees.len() < 3 {
        return Err(MergeError::InvalidInput(format!(
            "octopus merge needs a base and at least two heads, got {} trees",
            trees.len()
        )));
    }

    let base = trees[0];
    let mut acc = trees[1];
    for next in &trees[2..] {
        match merge_trees(odb, Some(&base), &acc, next, MergeStrategy::Recursive)? {
            MergeOutcome::Merged(id) => acc = id,
            conflicted => return Ok(conflicted),
        }
    }
    Ok(MergeOutcome::Merged(acc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_storage::MemoryStorage;
    use std::sync::Arc;

    fn odb() -> ObjectDatabase<MemoryStorage> {
        ObjectDatabase::new(Arc::new(MemoryStorage::new()))
    }

    fn tree_of<S: Storage>(
        odb: &ObjectDatabase<S>,
        files: &[(&str, &[u8])],
    ) -> ObjectId {
        let mut map = BTreeMap::new();
        for (path, content) in files {
            let id = odb.write(ObjectKind::Blob, content).unwrap();
            map.insert(path.to_string(), (EntryMode::Regular, id));
        }
        write_path_tree(odb, &map).unwrap()
    }

    #[test]
    fn merge_is_idempotent() {
        let odb = odb();
        let t = tree_of(&odb, &[("a", b"x")]);
        let out = merge_trees(&odb, Some(&t), &t, &t, MergeStrategy::Recursive).unwrap();
        assert_eq!(out.merged(), Some(t));
    }

    #[test]
    fn one_side_unchanged_takes_the_other() {
        let odb = odb();
        let base = tree_of(&odb, &[("a", b"x")]);
        let changed = tree_of(&odb, &[("a", b"y")]);

        let out = merge_trees(&odb, Some(&base), &base, &changed, MergeStrategy::Recursive).unwrap();
        assert_eq!(out.merged(), Some(changed));

        let out = merge_trees(&odb, Some(&base), &changed, &base, MergeStrategy::Recursive).unwrap();
        assert_eq!(out.merged(), Some(changed));
    }

    #[test]
    fn disjoint_additions_merge() {
        let odb = odb();
        let base = tree_of(&odb, &[("a", b"x")]);
        let ours = tree_of(&odb, &[("a", b"x"), ("b", b"1")]);
        let theirs = tree_of(&odb, &[("a", b"x"), ("c", b"2")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Recursive).unwrap();
        let merged = out.merged().expect("no conflicts");
        let map = flatten_tree(&odb, &merged).unwrap();

        let paths: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
        // Original blob ids survive untouched.
        assert_eq!(map["a"].1, odb.write(ObjectKind::Blob, b"x").unwrap());
        assert_eq!(map["b"].1, odb.write(ObjectKind::Blob, b"1").unwrap());
        assert_eq!(map["c"].1, odb.write(ObjectKind::Blob, b"2").unwrap());
    }

    #[test]
    fn both_modified_same_path_conflicts() {
        let odb = odb();
        let base = tree_of(&odb, &[("a", b"original")]);
        let ours = tree_of(&odb, &[("a", b"our")]);
        let theirs = tree_of(&odb, &[("a", b"their")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Recursive).unwrap();
        match out {
            MergeOutcome::Conflicted(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].path, "a");
            }
            MergeOutcome::Merged(_) => panic!("expected a conflict"),
        }
    }

    #[test]
    fn compatible_line_edits_content_merge() {
        let odb = odb();
        let base = tree_of(&odb, &[("f", b"one\ntwo\nthree")]);
        let ours = tree_of(&odb, &[("f", b"ONE\ntwo\nthree")]);
        let theirs = tree_of(&odb, &[("f", b"one\ntwo\nTHREE")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Recursive).unwrap();
        let merged = out.merged().expect("content merge succeeds");
        let map = flatten_tree(&odb, &merged).unwrap();
        assert_eq!(odb.read(&map["f"].1).unwrap().data.as_ref(), b"ONE\ntwo\nTHREE");
    }

    #[test]
    fn resolve_strategy_skips_content_merge() {
        let odb = odb();
        let base = tree_of(&odb, &[("f", b"one\ntwo\nthree")]);
        let ours = tree_of(&odb, &[("f", b"ONE\ntwo\nthree")]);
        let theirs = tree_of(&odb, &[("f", b"one\ntwo\nTHREE")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Resolve).unwrap();
        assert!(matches!(out, MergeOutcome::Conflicted(_)));
    }

    #[test]
    fn binary_content_conflicts() {
        let odb = odb();
        let base = tree_of(&odb, &[("f", b"a\0b")]);
        let ours = tree_of(&odb, &[("f", b"a\0c")]);
        let theirs = tree_of(&odb, &[("f", b"a\0d")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Recursive).unwrap();
        assert!(matches!(out, MergeOutcome::Conflicted(_)));
    }

    #[test]
    fn modify_delete_keeps_the_modification() {
        let odb = odb();
        let base = tree_of(&odb, &[("a", b"x"), ("keep", b"k")]);
        let ours = tree_of(&odb, &[("a", b"modified"), ("keep", b"k")]);
        let theirs = tree_of(&odb, &[("keep", b"k")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Recursive).unwrap();
        let map = flatten_tree(&odb, &out.merged().unwrap()).unwrap();
        assert!(map.contains_key("a"), "our modification survives their delete");
    }

    #[test]
    fn delete_of_unchanged_path_wins() {
        let odb = odb();
        let base = tree_of(&odb, &[("a", b"x"), ("keep", b"k")]);
        let ours = tree_of(&odb, &[("a", b"x"), ("keep", b"k")]);
        let theirs = tree_of(&odb, &[("keep", b"k")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Recursive).unwrap();
        let map = flatten_tree(&odb, &out.merged().unwrap()).unwrap();
        assert!(!map.contains_key("a"), "unchanged path stays deleted");
    }

    #[test]
    fn both_added_identically_merges() {
        let odb = odb();
        let base = tree_of(&odb, &[]);
        let ours = tree_of(&odb, &[("new", b"same")]);
        let theirs = tree_of(&odb, &[("new", b"same")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Recursive).unwrap();
        assert!(out.merged().is_some());
    }

    #[test]
    fn both_added_differently_conflicts() {
        let odb = odb();
        let base = tree_of(&odb, &[]);
        let ours = tree_of(&odb, &[("new", b"ours")]);
        let theirs = tree_of(&odb, &[("new", b"theirs")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Recursive).unwrap();
        assert!(matches!(out, MergeOutcome::Conflicted(_)));
    }

    #[test]
    fn ours_and_theirs_strategies() {
        let odb = odb();
        let base = tree_of(&odb, &[("a", b"base")]);
        let ours = tree_of(&odb, &[("a", b"ours")]);
        let theirs = tree_of(&odb, &[("a", b"theirs")]);

        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Ours).unwrap();
        assert_eq!(out.merged(), Some(ours));
        let out = merge_trees(&odb, Some(&base), &ours, &theirs, MergeStrategy::Theirs).unwrap();
        assert_eq!(out.merged(), Some(theirs));
    }

    #[test]
    fn octopus_folds_left_to_right() {
        let odb = odb();
        let base = tree_of(&odb, &[("shared", b"s")]);
        let one = tree_of(&odb, &[("shared", b"s"), ("one", b"1")]);
        let two = tree_of(&odb, &[("shared", b"s"), ("two", b"2")]);
        let three = tree_of(&odb, &[("shared", b"s"), ("three", b"3")]);

        let out = merge_octopus(&odb, &[base, one, two, three]).unwrap();
        let map = flatten_tree(&odb, &out.merged().unwrap()).unwrap();
        let paths: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["one", "shared", "three", "two"]);
    }

    #[test]
    fn octopus_needs_three_trees() {
        let odb = odb();
        let t = tree_of(&odb, &[("a", b"x")]);
        assert!(matches!(
            merge_octopus(&odb, &[t, t]),
            Err(MergeError::InvalidInput(_))
        ));
    }

    #[test]
    fn no_base_merges_against_empty_tree() {
        let odb = odb();
        let ours = tree_of(&odb, &[("a", b"1")]);
        let theirs = tree_of(&odb, &[("b", b"2")]);

        let out = merge_trees(&odb, None, &ours, &theirs, MergeStrategy::Recursive).unwrap();
        let map = flatten_tree(&odb, &out.merged().unwrap()).unwrap();
        assert_eq!(map.len(), 2);
    }
}
