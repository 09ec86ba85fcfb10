//! Similarity-based rename detection.
//!
//! Candidates are the cross product of paths deleted by the new tree and
//! paths added by it. Similarity is Jaccard over unique content lines.
//! Matches above the threshold are taken greedily in descending similarity,
//! each path used at most once.

use crate::Result;
use keel_core::ObjectId;
use keel_odb::{flatten_tree, ObjectDatabase};
use keel_storage::Storage;
use std::collections::HashSet;

/// A detected rename.
#[derive(Debug, Clone, PartialEq)]
pub struct Rename {
    /// Path in the old tree.
    pub from: String,
    /// Path in the new tree.
    pub to: String,
    /// Jaccard similarity in `[0, 1]`.
    pub similarity: f64,
}

/// Detects renames between two trees at the given similarity threshold.
pub fn detect_renames<S: Storage>(
    odb: &ObjectDatabase<S>,
    old_tree: &ObjectId,
    new_tree: &ObjectId,
    threshold: f64,
) -> Result<Vec<Rename>> {
    let old_map = flatten_tree(odb, old_tree)?;
    let new_map = flatten_tree(odb, new_tree)?;

    let deleted: Vec<&String> = old_map.keys().filter(|p| !new_map.contains_key(*p)).collect();
    let added: Vec<&String> = new_map.keys().filter(|p| !old_map.contains_key(*p)).collect();

    let mut candidates: Vec<Rename> = Vec::new();
    for from in &deleted {
        let old_lines = unique_lines(odb, &old_map[*from].1)?;
        for to in &added {
            let new_lines = unique_lines(odb, &new_map[*to].1)?;
            let similarity = jaccard(&old_lines, &new_lines);
            if similarity > threshold {
                candidates.push(Rename {
                    from: (*from).clone(),
                    to: (*to).clone(),
                    similarity,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.from.cmp(&b.from))
    });

    let mut used_from: HashSet<&str> = HashSet::new();
    let mut used_to: HashSet<&str> = HashSet::new();
    let mut renames = Vec::new();
    for candidate in &candidates {
        if used_from.contains(candidate.from.as_str()) || used_to.contains(candidate.to.as_str()) {
            continue;
        }
        used_from.insert(&candidate.from);
        used_to.insert(&candidate.to);
        renames.push(candidate.clone());
    }
    Ok(renames)
}

fn unique_lines<S: Storage>(
    odb: &ObjectDatabase<S>,
    id: &ObjectId,
) -> Result<HashSet<String>> {
    let data = odb.read(id)?.data;
    Ok(String::from_utf8_lossy(&data)
        .split('\n')
        .map(str::to_string)
        .collect())
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{EntryMode, ObjectKind};
    use keel_odb::write_path_tree;
    use keel_storage::MemoryStorage;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn odb() -> ObjectDatabase<MemoryStorage> {
        ObjectDatabase::new(Arc::new(MemoryStorage::new()))
    }

    fn tree_of<S: Storage>(odb: &ObjectDatabase<S>, files: &[(&str, &[u8])]) -> ObjectId {
        let mut map = BTreeMap::new();
        for (path, content) in files {
            let id = odb.write(ObjectKind::Blob, content).unwrap();
            map.insert(path.to_string(), (EntryMode::Regular, id));
        }
        write_path_tree(odb, &map).unwrap()
    }

    #[test]
    fn identical_content_is_a_rename() {
        let odb = odb();
        let old = tree_of(&odb, &[("old.txt", b"same content here")]);
        let new = tree_of(&odb, &[("new.txt", b"same content here")]);

        let renames = detect_renames(&odb, &old, &new, 0.5).unwrap();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].from, "old.txt");
        assert_eq!(renames[0].to, "new.txt");
        assert!(renames[0].similarity > 0.9);
    }

    #[test]
    fn unrelated_content_is_not_a_rename() {
        let odb = odb();
        let old = tree_of(&odb, &[("a.txt", b"alpha\nbeta\ngamma")]);
        let new = tree_of(&odb, &[("b.txt", b"one\ntwo\nthree")]);

        assert!(detect_renames(&odb, &old, &new, 0.5).unwrap().is_empty());
    }

    #[test]
    fn surviving_paths_are_not_candidates() {
        let odb = odb();
        let old = tree_of(&odb, &[("keep.txt", b"content"), ("old.txt", b"moved")]);
        let new = tree_of(&odb, &[("keep.txt", b"content"), ("new.txt", b"moved")]);

        let renames = detect_renames(&odb, &old, &new, 0.5).unwrap();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].from, "old.txt");
    }

    #[test]
    fn greedy_matching_keeps_paths_unique() {
        let odb = odb();
        // Two deletions could each match the single addition; only the best
        // pairing survives.
        let old = tree_of(
            &odb,
            &[
                ("exact.txt", b"line1\nline2\nline3\nline4".as_slice()),
                ("close.txt", b"line1\nline2\nline3\nother".as_slice()),
            ],
        );
        let new = tree_of(&odb, &[("moved.txt", b"line1\nline2\nline3\nline4")]);

        let renames = detect_renames(&odb, &old, &new, 0.3).unwrap();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].from, "exact.txt");
        assert_eq!(renames[0].to, "moved.txt");
    }

    #[test]
    fn threshold_is_exclusive() {
        let odb = odb();
        // Two lines of four shared: jaccard 2/6 = 0.333...
        let old = tree_of(&odb, &[("a", b"one\ntwo\nthree\nfour")]);
        let new = tree_of(&odb, &[("b", b"one\ntwo\nfive\nsix")]);

        assert!(detect_renames(&odb, &old, &new, 0.4).unwrap().is_empty());
        assert_eq!(detect_renames(&odb, &old, &new, 0.3).unwrap().len(), 1);
    }
}
