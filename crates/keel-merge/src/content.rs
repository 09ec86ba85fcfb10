//! Line-level three-way content merge.

/// Bytes inspected when deciding whether content is binary.
const BINARY_SNIFF_LEN: usize = 8192;

/// Conflict hunk markers.
const OURS_MARKER: &str = "<<<<<<< ours";
const SPLIT_MARKER: &str = "=======";
const THEIRS_MARKER: &str = ">>>>>>> theirs";

/// Returns true when the first 8 KiB contain a NUL byte.
pub fn is_binary(data: &[u8]) -> bool {
    data.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// Merges `ours` and `theirs` against `base`, line by line.
///
/// Lines are index-aligned triples: a unanimous line is emitted once; when
/// one side matches base the other side wins; otherwise a conflict hunk is
/// emitted and the merge is marked conflicted. Returns the merged bytes and
/// whether any hunk was emitted.
pub fn merge_content(base: &[u8], ours: &[u8], theirs: &[u8]) -> (Vec<u8>, bool) {
    let base_lines = split_lines(base);
    let our_lines = split_lines(ours);
    let their_lines = split_lines(theirs);

    let rows = base_lines.len().max(our_lines.len()).max(their_lines.len());
    let mut out: Vec<String> = Vec::with_capacity(rows);
    let mut conflicted = false;

    for i in 0..rows {
        let b = base_lines.get(i);
        let o = our_lines.get(i);
        let t = their_lines.get(i);

        if o == t {
            if let Some(line) = o {
                out.push(line.clone());
            }
        } else if o == b {
            if let Some(line) = t {
                out.push(line.clone());
            }
        } else if t == b {
            if let Some(line) = o {
                out.push(line.clone());
            }
        } else {
            conflicted = true;
            out.push(OURS_MARKER.to_string());
            out.push(o.cloned().unwrap_or_default());
            out.push(SPLIT_MARKER.to_string());
            out.push(t.cloned().unwrap_or_default());
            out.push(THEIRS_MARKER.to_string());
        }
    }

    (out.join("\n").into_bytes(), conflicted)
}

fn split_lines(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .split('\n')
        .map(str::to_string)
        .collect()
}
