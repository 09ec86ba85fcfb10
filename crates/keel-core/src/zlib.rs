//! Zlib helpers for loose objects and pack entries.

use crate::{CoreError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compresses bytes with the default zlib level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CoreError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CoreError::Compression(e.to_string()))
}

/// Decompresses a complete zlib stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CoreError::Compression(e.to_string()))?;
    Ok(out)
}

/// Decompresses a zlib stream sitting at the start of `data`, where more
/// bytes may follow the stream. Returns the inflated bytes and the number of
/// compressed input bytes consumed, which the pack reader uses to find the
/// next entry.
pub fn decompress_prefix(data: &[u8], expected_len: usize) -> Result<(Vec<u8>, usize)> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CoreError::Compression(e.to_string()))?;

    if out.len() != expected_len {
        return Err(CoreError::Corrupt(format!(
            "inflated {} bytes, header promised {}",
            out.len(),
            expected_len
        )));
    }

    let consumed = decoder.total_in() as usize;
    Ok((out, consumed))
}
