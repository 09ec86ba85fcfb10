//! PACK v2 reader.
//!
//! Parsing is two-pass. The first pass walks the byte stream and indexes
//! every entry by its pack offset, inflating each entry's payload with a
//! streaming decoder that reports how much compressed input it consumed.
//! The second pass resolves deltas as a bounded fixed-point iteration:
//! every pass materializes the deltas whose bases became available, either
//! from the pack itself or from the destination object database.

use crate::delta::apply_delta;
use crate::{PackError, Result, PACK_SIGNATURE, PACK_VERSION};
use keel_core::{varint, zlib, AbortSignal, ObjectId, ObjectKind};
use keel_odb::ObjectDatabase;
use keel_storage::Storage;
use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// Delta resolution passes before giving up.
const MAX_RESOLVE_PASSES: usize = 10;

const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

#[derive(Debug)]
enum EntryKind {
    Object(ObjectKind),
    OfsDelta { base_offset: u64 },
    RefDelta { base_id: ObjectId },
}

#[derive(Debug)]
struct RawEntry {
    offset: u64,
    kind: EntryKind,
    data: Vec<u8>,
}

/// Parses a complete pack byte stream, writing every materialized object
/// into `odb`. Returns the ids in pack entry order.
pub fn parse_pack<S: Storage>(
    data: &[u8],
    odb: &ObjectDatabase<S>,
    abort: &AbortSignal,
) -> Result<Vec<ObjectId>> {
    let entries = index_entries(data, abort)?;
    resolve_entries(entries, odb, abort)
}

/// First pass: walk the stream and index raw entries by offset.
fn index_entries(data: &[u8], abort: &AbortSignal) -> Result<Vec<RawEntry>> {
    if data.len() < 32 {
        return Err(PackError::Corrupt("pack too small".into()));
    }
    if &data[..4] != PACK_SIGNATURE {
        return Err(PackError::Corrupt("bad pack signature".into()));
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != PACK_VERSION {
        return Err(PackError::Corrupt(format!(
            "unsupported pack version: {}",
            version
        )));
    }
    let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;
    let body_end = data.len() - 20;

    let mut entries = Vec::with_capacity(count);
    let mut pos = 12usize;

    for _ in 0..count {
        abort.check()?;
        let entry_offset = pos as u64;

        let mut byte = *data
            .get(pos)
            .ok_or_else(|| PackError::Corrupt("pack truncated in entry header".into()))?;
        pos += 1;
        let type_code = (byte >> 4) & 0x07;
        let mut size = (byte & 0x0F) as u64;
        let mut shift = 4u32;
        while byte & 0x80 != 0 {
            byte = *data
                .get(pos)
                .ok_or_else(|| PackError::Corrupt("pack truncated in size header".into()))?;
            pos += 1;
            size |= u64::from(byte & 0x7F) << shift;
            shift += 7;
            if shift > 63 {
                return Err(PackError::Corrupt("entry size varint too long".into()));
            }
        }

        let kind = match type_code {
            OFS_DELTA => {
                let (distance, consumed) = varint::read_ofs_distance(&data[pos..body_end])?;
                pos += consumed;
                let base_offset = entry_offset.checked_sub(distance).ok_or_else(|| {
                    PackError::Corrupt("ofs-delta distance reaches before pack start".into())
                })?;
                EntryKind::OfsDelta { base_offset }
            }
            REF_DELTA => {
                if pos + 20 > body_end {
                    return Err(PackError::Corrupt("pack truncated in ref-delta base".into()));
                }
                let base_id = ObjectId::from_slice(&data[pos..pos + 20])?;
                pos += 20;
                EntryKind::RefDelta { base_id }
            }
            code => EntryKind::Object(ObjectKind::from_pack_type(code)?),
        };

        if pos >= body_end {
            return Err(PackError::Corrupt("pack truncated before payload".into()));
        }
        let (inflated, consumed) = zlib::decompress_prefix(&data[pos..body_end], size as usize)?;
        pos += consumed;

        entries.push(RawEntry {
            offset: entry_offset,
            kind,
            data: inflated,
        });
    }

    if pos != body_end {
        return Err(PackError::Corrupt(format!(
            "{} trailing bytes between entries and checksum",
            body_end - pos
        )));
    }

    let mut hasher = Sha1::new();
    hasher.update(&data[..body_end]);
    if hasher.finalize().as_slice() != &data[body_end..] {
        // Tolerated: the stream is structurally sound even when the
        // trailing checksum disagrees.
        tracing::warn!("pack checksum mismatch");
    }

    Ok(entries)
}

/// Second pass: materialize objects, iterating until every delta resolves.
fn resolve_entries<S: Storage>(
    entries: Vec<RawEntry>,
    odb: &ObjectDatabase<S>,
    abort: &AbortSignal,
) -> Result<Vec<ObjectId>> {
    let total = entries.len();
    let mut resolved: HashMap<u64, (ObjectKind, Vec<u8>)> = HashMap::with_capacity(total);
    let mut offset_by_id: HashMap<ObjectId, u64> = HashMap::with_capacity(total);
    let mut id_by_offset: HashMap<u64, ObjectId> = HashMap::with_capacity(total);

    let store = |offset: u64,
                     kind: ObjectKind,
                     bytes: Vec<u8>,
                     resolved: &mut HashMap<u64, (ObjectKind, Vec<u8>)>,
                     offset_by_id: &mut HashMap<ObjectId, u64>,
                     id_by_offset: &mut HashMap<u64, ObjectId>|
     -> Result<()> {
        let id = odb.write(kind, &bytes)?;
        offset_by_id.insert(id, offset);
        id_by_offset.insert(offset, id);
        resolved.insert(offset, (kind, bytes));
        Ok(())
    };

    // Non-delta entries materialize immediately.
    let mut pending: Vec<RawEntry> = Vec::new();
    for entry in entries {
        match entry.kind {
            EntryKind::Object(kind) => store(
                entry.offset,
                kind,
                entry.data,
                &mut resolved,
                &mut offset_by_id,
                &mut id_by_offset,
            )?,
            _ => pending.push(entry),
        }
    }

    let mut passes = 0;
    while !pending.is_empty() && passes < MAX_RESOLVE_PASSES {
        abort.check().map_err(PackError::from)?;
        passes += 1;
        let mut still_pending = Vec::with_capacity(pending.len());
        let mut progress = false;

        for entry in pending {
            let base = match &entry.kind {
                EntryKind::OfsDelta { base_offset } => {
                    resolved.get(base_offset).map(|(k, b)| (*k, b.clone()))
                }
                EntryKind::RefDelta { base_id } => {
                    if let Some(offset) = offset_by_id.get(base_id) {
                        resolved.get(offset).map(|(k, b)| (*k, b.clone()))
                    } else if odb.has(base_id)? {
                        let object = odb.read(base_id)?;
                        Some((object.kind, object.data.to_vec()))
                    } else {
                        None
                    }
                }
                EntryKind::Object(_) => unreachable!("non-delta entries resolve in pass zero"),
            };

            match base {
                Some((kind, base_bytes)) => {
                    let bytes = apply_delta(&base_bytes, &entry.data)?;
                    store(
                        entry.offset,
                        kind,
                        bytes,
                        &mut resolved,
                        &mut offset_by_id,
                        &mut id_by_offset,
                    )?;
                    progress = true;
                }
                None => still_pending.push(entry),
            }
        }

        pending = still_pending;
        if !progress {
            break;
        }
    }

    if !pending.is_empty() {
        return Err(PackError::UnresolvedDelta {
            passes,
            remaining: pending.len(),
        });
    }

    // Ids in pack entry order.
    let mut offsets: Vec<u64> = id_by_offset.keys().copied().collect();
    offsets.sort_unstable();
    Ok(offsets
        .into_iter()
        .filter_map(|o| id_by_offset.get(&o).copied())
        .collect())
}
