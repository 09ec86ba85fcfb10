//! The upload-pack service (fetch/clone) and its client-side codec.

use crate::{PktLine, PktReader, PktWriter, ProtocolError, Result};
use keel_core::{AbortSignal, ObjectId, ObjectKind};
use keel_odb::ObjectDatabase;
use keel_pack::write_pack;
use keel_storage::Storage;
use std::collections::{HashSet, VecDeque};

/// Side-band payload limit: a 65519-byte packet minus the channel byte.
const SIDE_BAND_CHUNK: usize = 65515;
const CHANNEL_PACK: u8 = 1;
const CHANNEL_PROGRESS: u8 = 2;
const CHANNEL_ERROR: u8 = 3;

/// A parsed upload-pack request body.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// Tips the client wants.
    pub wants: Vec<ObjectId>,
    /// Tips the client already has.
    pub haves: Vec<ObjectId>,
}

impl FetchRequest {
    /// Parses the pkt-line request body. Capability text after a want oid
    /// is tolerated and discarded. Polls `abort` between packets.
    pub fn parse(body: &[u8], abort: &AbortSignal) -> Result<Self> {
        let mut reader = PktReader::new(body);
        let mut request = Self::default();

        loop {
            abort.check()?;
            let pkt = match reader.next_packet()? {
                Some(pkt) => pkt,
                None => break,
            };
            let line = match pkt.as_text() {
                Some(line) => line.trim(),
                None => continue,
            };

            if let Some(rest) = line.strip_prefix("want ") {
                request.wants.push(parse_oid_prefix(rest)?);
            } else if let Some(rest) = line.strip_prefix("have ") {
                request.haves.push(parse_oid_prefix(rest)?);
            } else if line == "done" {
                break;
            }
        }
        Ok(request)
    }
}

fn parse_oid_prefix(rest: &str) -> Result<ObjectId> {
    let hex = rest.get(..40).ok_or_else(|| {
        ProtocolError::Protocol(format!("short object id in request: {:?}", rest))
    })?;
    Ok(ObjectId::from_hex(hex)?)
}

/// Serves an upload-pack request: negotiates trivially (single NAK),
/// builds the pack for the wanted closure, and wraps it in side-band-64k
/// channel-1 packets.
pub fn handle_upload_pack<S: Storage>(
    body: &[u8],
    odb: &ObjectDatabase<S>,
    abort: &AbortSignal,
) -> Result<Vec<u8>> {
    let request = FetchRequest::parse(body, abort)?;

    let mut writer = PktWriter::new();
    writer.line("NAK");

    if request.wants.is_empty() {
        writer.flush();
        return Ok(writer.finish());
    }

    let objects = collect_closure(odb, &request.wants, &request.haves, abort)?;
    let pack = write_pack(&objects, odb)?;

    for chunk in pack.chunks(SIDE_BAND_CHUNK) {
        abort.check()?;
        let mut framed = Vec::with_capacity(chunk.len() + 1);
        framed.push(CHANNEL_PACK);
        framed.extend_from_slice(chunk);
        writer.data(&framed)?;
    }
    writer.flush();

    tracing::debug!(
        objects = objects.len(),
        pack_bytes = pack.len(),
        "upload-pack served"
    );
    Ok(writer.finish())
}

/// Walks the commit graph breadth-first from `wants`, stopping at `haves`,
/// collecting each commit with its full tree closure.
fn collect_closure<S: Storage>(
    odb: &ObjectDatabase<S>,
    wants: &[ObjectId],
    haves: &[ObjectId],
    abort: &AbortSignal,
) -> Result<Vec<ObjectId>> {
    let have_set: HashSet<&ObjectId> = haves.iter().collect();
    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut objects: Vec<ObjectId> = Vec::new();
    let mut queue: VecDeque<ObjectId> = wants.iter().copied().collect();

    while let Some(commit_id) = queue.pop_front() {
        abort.check()?;
        if have_set.contains(&commit_id) || !visited.insert(commit_id) {
            continue;
        }

        let object = odb.read(&commit_id)?;
        objects.push(commit_id);
        if object.kind != ObjectKind::Commit {
            continue;
        }

        let commit = keel_core::Commit::parse(&object.data)?;
        collect_tree(odb, &commit.tree, &mut visited, &mut objects)?;
        for parent in &commit.parents {
            queue.push_back(*parent);
        }
    }
    Ok(objects)
}

fn collect_tree<S: Storage>(
    odb: &ObjectDatabase<S>,
    tree_id: &ObjectId,
    visited: &mut HashSet<ObjectId>,
    objects: &mut Vec<ObjectId>,
) -> Result<()> {
    if !visited.insert(*tree_id) {
        return Ok(());
    }
    objects.push(*tree_id);

    let tree = odb.read_tree(tree_id)?;
    for entry in tree.entries() {
        if entry.mode.is_tree() {
            collect_tree(odb, &entry.id, visited, objects)?;
        } else if visited.insert(entry.id) {
            objects.push(entry.id);
        }
    }
    Ok(())
}

/// Renders a fetch request body: wants (first line may carry capabilities),
/// a flush, haves, and the terminating `done`.
pub fn build_fetch_request(wants: &[ObjectId], haves: &[ObjectId]) -> Result<Vec<u8>> {
    let mut writer = PktWriter::new();

    for (i, want) in wants.iter().enumerate() {
        if i == 0 {
            writer.line(&format!("want {} side-band-64k ofs-delta", want));
        } else {
            writer.line(&format!("want {}", want));
        }
    }
    writer.flush();
    for have in haves {
        writer.line(&format!("have {}", have));
    }
    writer.line("done");
    Ok(writer.finish())
}

/// Parses an upload-pack response: the NAK line followed by side-band
/// packets. Returns the reassembled pack bytes.
pub fn parse_fetch_response(body: &[u8]) -> Result<Vec<u8>> {
    let mut reader = PktReader::new(body);
    let mut pack = Vec::new();
    let mut saw_ack = false;

    loop {
        let pkt = match reader.next_packet()? {
            Some(PktLine::Flush) | None => break,
            Some(pkt) => pkt,
        };
        let data = match pkt.data() {
            Some(d) if !d.is_empty() => d,
            _ => continue,
        };

        if !saw_ack {
            let text = String::from_utf8_lossy(data);
            let text = text.trim();
            if text == "NAK" || text.starts_with("ACK ") {
                saw_ack = true;
                continue;
            }
        }

        match data[0] {
            CHANNEL_PACK => pack.extend_from_slice(&data[1..]),
            CHANNEL_PROGRESS => {
                tracing::debug!(message = %String::from_utf8_lossy(&data[1..]).trim(), "remote progress");
            }
            CHANNEL_ERROR => {
                return Err(ProtocolError::Remote(
                    String::from_utf8_lossy(&data[1..]).trim().to_string(),
                ));
            }
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "unknown side-band channel: {}",
                    other
                )))
            }
        }
    }
    Ok(pack)
}
