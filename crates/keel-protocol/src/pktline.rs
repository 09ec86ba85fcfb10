//! pkt-line framing.
//!
//! A packet is `XXXX<payload>` where `XXXX` is the lowercase-hex length of
//! the whole packet, payload included. `0000` is the flush packet ending a
//! stream section.
//!
//! Both services hand complete request bodies to this layer, so the reader
//! is a cursor over a byte slice rather than a stream wrapper; whatever the
//! cursor has not consumed (the raw pack after a receive-pack command
//! section) stays addressable through [`PktReader::remainder`]. The writer
//! owns its output buffer and is drained once with [`PktWriter::finish`].

use crate::{ProtocolError, Result};

/// Largest payload a single packet can carry: the four hex digits bound the
/// whole packet at 65535 bytes, minus the length field and the slack real
/// git reserves.
pub const MAX_PKT_PAYLOAD: usize = 65520;

const FLUSH_BYTES: &[u8; 4] = b"0000";
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A single pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data packet with payload.
    Data(Vec<u8>),
    /// Flush packet (`0000`).
    Flush,
}

impl PktLine {
    /// Builds a data packet from protocol text. Text packets always end in
    /// a newline on the wire, so one is appended when missing.
    pub fn text(line: &str) -> Self {
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        if payload.last() != Some(&b'\n') {
            payload.push(b'\n');
        }
        Self::Data(payload)
    }

    /// Appends the wire form of this packet to `out`.
    pub fn write_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Flush => out.extend_from_slice(FLUSH_BYTES),
            Self::Data(payload) => {
                let total = payload.len() + 4;
                for shift in [12u32, 8, 4, 0] {
                    out.push(HEX_DIGITS[(total >> shift) & 0xF]);
                }
                out.extend_from_slice(payload);
            }
        }
    }

    /// Returns the wire form of this packet.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data().map_or(0, <[u8]>::len));
        self.write_into(&mut out);
        out
    }

    /// Returns the payload for data packets.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(payload) => Some(payload),
            Self::Flush => None,
        }
    }

    /// Returns the payload as text, without the trailing newline.
    pub fn as_text(&self) -> Option<&str> {
        let text = std::str::from_utf8(self.data()?).ok()?;
        Some(text.strip_suffix('\n').unwrap_or(text))
    }

    /// Returns true for the flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }
}

fn hex_nibble(byte: u8) -> Result<usize> {
    match byte {
        b'0'..=b'9' => Ok(usize::from(byte - b'0')),
        b'a'..=b'f' => Ok(usize::from(byte - b'a') + 10),
        _ => Err(ProtocolError::Protocol(format!(
            "bad pkt-line length digit: {:?}",
            byte as char
        ))),
    }
}

/// Cursor over a pkt-line byte slice.
pub struct PktReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PktReader<'a> {
    /// Starts a cursor at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The bytes the cursor has not consumed. Receive-pack reads the raw
    /// pack stream from here once the command section ends.
    pub fn remainder(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Decodes the next packet; `None` at end of input.
    pub fn next_packet(&mut self) -> Result<Option<PktLine>> {
        if self.pos == self.buf.len() {
            return Ok(None);
        }
        let header = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| ProtocolError::Protocol("truncated pkt-line length".into()))?;
        let total =
            (hex_nibble(header[0])? << 12)
                | (hex_nibble(header[1])? << 8)
                | (hex_nibble(header[2])? << 4)
                | hex_nibble(header[3])?;

        if total == 0 {
            self.pos += 4;
            return Ok(Some(PktLine::Flush));
        }

        let payload_len = total.checked_sub(4).ok_or_else(|| {
            ProtocolError::Protocol(format!("pkt-line length {} too small", total))
        })?;
        if payload_len > MAX_PKT_PAYLOAD {
            return Err(ProtocolError::Protocol(format!(
                "pkt-line payload {} exceeds maximum",
                payload_len
            )));
        }

        let payload = self
            .buf
            .get(self.pos + 4..self.pos + total)
            .ok_or_else(|| ProtocolError::Protocol("truncated pkt-line payload".into()))?;
        self.pos += total;
        Ok(Some(PktLine::Data(payload.to_vec())))
    }

    /// Collects data packets up to the next flush (or end of input).
    pub fn section(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        while let Some(pkt) = self.next_packet()? {
            if pkt.is_flush() {
                break;
            }
            packets.push(pkt);
        }
        Ok(packets)
    }
}

/// Accumulates packets into an owned wire buffer.
#[derive(Debug, Default)]
pub struct PktWriter {
    out: Vec<u8>,
}

impl PktWriter {
    /// Starts an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one packet.
    pub fn packet(&mut self, pkt: &PktLine) {
        pkt.write_into(&mut self.out);
    }

    /// Appends a text line, newline included.
    pub fn line(&mut self, text: &str) {
        self.packet(&PktLine::text(text));
    }

    /// Appends a raw data packet, refusing payloads the four hex digits
    /// cannot frame.
    pub fn data(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PKT_PAYLOAD {
            return Err(ProtocolError::Protocol(format!(
                "pkt-line payload {} exceeds maximum",
                payload.len()
            )));
        }
        self.packet(&PktLine::Data(payload.to_vec()));
        Ok(())
    }

    /// Appends the flush packet.
    pub fn flush(&mut self) {
        self.packet(&PktLine::Flush);
    }

    /// Consumes the writer, yielding the wire bytes.
    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_known_vectors() {
        assert_eq!(PktLine::text("hello").encode(), b"000ahello\n");
        assert_eq!(PktLine::text("NAK").encode(), b"0008NAK\n");
        assert_eq!(PktLine::Flush.encode(), b"0000");
    }

    #[test]
    fn text_appends_newline_once() {
        assert_eq!(PktLine::text("x").encode(), b"0006x\n");
        assert_eq!(PktLine::text("y\n").encode(), b"0006y\n");
    }

    #[test]
    fn roundtrip() {
        let mut writer = PktWriter::new();
        writer.line("want 0000000000000000000000000000000000000000");
        writer.line("done");
        writer.flush();
        let wire = writer.finish();

        let mut reader = PktReader::new(&wire);
        assert_eq!(
            reader.next_packet().unwrap().unwrap().as_text(),
            Some("want 0000000000000000000000000000000000000000")
        );
        assert_eq!(reader.next_packet().unwrap().unwrap().as_text(), Some("done"));
        assert_eq!(reader.next_packet().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.next_packet().unwrap(), None);
    }

    #[test]
    fn flush_parses() {
        let mut reader = PktReader::new(b"0000");
        assert_eq!(reader.next_packet().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.next_packet().unwrap(), None);
    }

    #[test]
    fn undersized_length_rejected() {
        let mut reader = PktReader::new(b"0003x");
        assert!(matches!(
            reader.next_packet(),
            Err(ProtocolError::Protocol(_))
        ));
    }

    #[test]
    fn non_hex_length_rejected() {
        let mut reader = PktReader::new(b"zzzz");
        assert!(reader.next_packet().is_err());
        // Uppercase hex is not the wire form either.
        let mut reader = PktReader::new(b"000Ahello\n");
        assert!(reader.next_packet().is_err());
    }

    #[test]
    fn truncated_payload_rejected() {
        let mut reader = PktReader::new(b"000ahel");
        assert!(reader.next_packet().is_err());
        let mut reader = PktReader::new(b"00");
        assert!(reader.next_packet().is_err());
    }

    #[test]
    fn oversized_payload_rejected_both_ways() {
        let mut writer = PktWriter::new();
        assert!(writer.data(&vec![0u8; MAX_PKT_PAYLOAD + 1]).is_err());
        assert!(writer.data(&vec![0u8; 16]).is_ok());

        // fff5 claims a 65521-byte payload, one past the cap.
        let mut reader = PktReader::new(b"fff5");
        assert!(reader.next_packet().is_err());
    }

    #[test]
    fn section_stops_at_flush_and_keeps_the_rest() {
        let mut writer = PktWriter::new();
        writer.line("one");
        writer.line("two");
        writer.flush();
        let mut wire = writer.finish();
        wire.extend_from_slice(b"RAWPACKBYTES");

        let mut reader = PktReader::new(&wire);
        let section = reader.section().unwrap();
        assert_eq!(section.len(), 2);
        assert_eq!(reader.remainder(), b"RAWPACKBYTES");
    }
}
