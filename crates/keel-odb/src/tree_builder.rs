//! Tree materialization from flat path maps.
//!
//! Both committing the index and finishing a merge end with the same step:
//! a sorted map of `path -> (mode, blob id)` becomes nested tree objects,
//! leaves first, with deterministic ordering throughout.

use crate::{ObjectDatabase, Result};
use keel_core::{EntryMode, ObjectId, Tree, TreeEntry};
use keel_storage::Storage;
use std::collections::BTreeMap;

/// Writes the tree hierarchy for a flat `path -> (mode, id)` map and
/// returns the root tree id. An empty map produces the empty tree.
pub fn write_path_tree<S: Storage>(
    odb: &ObjectDatabase<S>,
    entries: &BTreeMap<String, (EntryMode, ObjectId)>,
) -> Result<ObjectId> {
    build_level(odb, entries, "")
}

fn build_level<S: Storage>(
    odb: &ObjectDatabase<S>,
    entries: &BTreeMap<String, (EntryMode, ObjectId)>,
    prefix: &str,
) -> Result<ObjectId> {
    let mut leaves: Vec<TreeEntry> = Vec::new();
    let mut dirs: BTreeMap<String, BTreeMap<String, (EntryMode, ObjectId)>> = BTreeMap::new();

    for (path, (mode, id)) in entries {
        let rest = match prefix {
            "" => path.as_str(),
            _ => match path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                Some(rest) => rest,
                None => continue,
            },
        };
        match rest.split_once('/') {
            None => leaves.push(TreeEntry {
                mode: *mode,
                name: rest.to_string(),
                id: *id,
            }),
            Some((dir, _)) => {
                dirs.entry(dir.to_string())
                    .or_default()
                    .insert(path.clone(), (*mode, *id));
            }
        }
    }

    let mut tree = Tree::from_entries(leaves);
    for (dir, children) in &dirs {
        let child_prefix = match prefix {
            "" => dir.clone(),
            _ => format!("{}/{}", prefix, dir),
        };
        let child_id = build_level(odb, children, &child_prefix)?;
        tree.push(TreeEntry {
            mode: EntryMode::Directory,
            name: dir.clone(),
            id: child_id,
        });
    }

    odb.write_tree(&tree)
}

/// Flattens a tree into a `path -> (mode, id)` map, following subtrees.
pub fn flatten_tree<S: Storage>(
    odb: &ObjectDatabase<S>,
    tree_id: &ObjectId,
) -> Result<BTreeMap<String, (EntryMode, ObjectId)>> {
    let mut out = BTreeMap::new();
    collect(odb, tree_id, "", &mut out)?;
    Ok(out)
}

fn collect<S: Storage>(
    odb: &ObjectDatabase<S>,
    tree_id: &ObjectId,
    prefix: &str,
    out: &mut BTreeMap<String, (EntryMode, ObjectId)>,
) -> Result<()> {
    let tree = odb.read_tree(tree_id)?;
    for entry in tree.entries() {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        if entry.mode.is_tree() {
            collect(odb, &entry.id, &path, out)?;
        } else {
            out.insert(path, (entry.mode, entry.id));
        }
    }
    Ok(())
}
