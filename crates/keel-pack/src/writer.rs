//! PACK v2 writer.
//!
//! Emits every object as a literal (non-delta) entry: a size/type header
//! followed by the zlib stream of the raw payload. Output is deterministic
//! for a given input list, which keeps pushes reproducible.

use crate::{Result, PACK_SIGNATURE, PACK_VERSION};
use keel_core::{zlib, ObjectId};
use keel_odb::ObjectDatabase;
use keel_storage::Storage;
use sha1::{Digest, Sha1};

/// Builds a pack containing the given objects, in order.
pub fn write_pack<S: Storage>(ids: &[ObjectId], odb: &ObjectDatabase<S>) -> Result<Vec<u8>> {
    let mut pack = Vec::with_capacity(64 + ids.len() * 64);
    pack.extend_from_slice(PACK_SIGNATURE);
    pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack.extend_from_slice(&(ids.len() as u32).to_be_bytes());

    for id in ids {
        let object = odb.read(id)?;
        write_entry_header(&mut pack, object.kind.pack_type(), object.size() as u64);
        pack.extend_from_slice(&zlib::compress(&object.data)?);
    }

    let mut hasher = Sha1::new();
    hasher.update(&pack);
    let checksum = hasher.finalize();
    pack.extend_from_slice(&checksum);
    Ok(pack)
}

/// Writes the entry header: type in bits 4..6 of the first byte, size
/// little-endian seven bits at a time with the MSB as continuation.
fn write_entry_header(pack: &mut Vec<u8>, type_code: u8, mut size: u64) {
    let mut byte = (type_code << 4) | ((size & 0x0F) as u8);
    size >>= 4;
    if size > 0 {
        byte |= 0x80;
    }
    pack.push(byte);

    while size > 0 {
        let mut b = (size & 0x7F) as u8;
        size >>= 7;
        if size > 0 {
            b |= 0x80;
        }
        pack.push(b);
    }
}
