//! The receive-pack service (push) and its client-side codec.

use crate::{PktLine, PktReader, PktWriter, ProtocolError, Result};
use keel_core::{AbortSignal, ObjectId};
use keel_odb::{ObjectDatabase, RefDatabase};
use keel_pack::parse_pack;
use keel_storage::Storage;

/// One ref-update command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    /// Value the client last saw; zero for ref creation.
    pub old: ObjectId,
    /// Requested value; zero for ref deletion.
    pub new: ObjectId,
    /// Full ref name, e.g. `refs/heads/main`.
    pub name: String,
}

impl RefUpdate {
    /// Returns true when this command deletes the ref.
    pub fn is_delete(&self) -> bool {
        self.new.is_zero()
    }

    /// Returns true when this command creates the ref.
    pub fn is_create(&self) -> bool {
        self.old.is_zero()
    }
}

/// The status report a push receives back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStatus {
    /// Whether the pack unpacked cleanly.
    pub unpack_ok: bool,
    /// Per-ref outcome: `(name, error message if rejected)`.
    pub refs: Vec<(String, Option<String>)>,
}

impl ReportStatus {
    /// Returns true when the pack unpacked and every ref was accepted.
    pub fn is_ok(&self) -> bool {
        self.unpack_ok && self.refs.iter().all(|(_, err)| err.is_none())
    }
}

/// Serves a receive-pack request: parses commands, ingests the pack, then
/// applies the ref updates. The pack is fully resolved before any ref is
/// written, so a bad pack leaves refs untouched.
pub fn handle_receive_pack<S: Storage>(
    body: &[u8],
    odb: &ObjectDatabase<S>,
    refs: &RefDatabase<S>,
    abort: &AbortSignal,
) -> Result<Vec<u8>> {
    let mut reader = PktReader::new(body);
    let mut commands: Vec<RefUpdate> = Vec::new();

    loop {
        abort.check()?;
        match reader.next_packet()? {
            Some(PktLine::Flush) | None => break,
            Some(pkt) => {
                let data = match pkt.data() {
                    Some(d) => d,
                    None => continue,
                };
                commands.push(parse_command(data)?);
            }
        }
    }

    // Whatever follows the command section is the raw pack stream.
    let pack = reader.remainder();
    if !pack.is_empty() {
        parse_pack(pack, odb, abort)?;
    }

    for command in &commands {
        if command.is_delete() {
            if let Err(e) = refs.delete(&command.name) {
                tracing::debug!(name = %command.name, error = %e, "delete of absent ref");
            }
        } else {
            refs.write(&command.name, &command.new)?;
        }
    }

    let mut writer = PktWriter::new();
    writer.line("unpack ok");
    for command in &commands {
        writer.line(&format!("ok {}", command.name));
    }
    writer.flush();

    tracing::debug!(commands = commands.len(), pack_bytes = pack.len(), "receive-pack applied");
    Ok(writer.finish())
}

fn parse_command(data: &[u8]) -> Result<RefUpdate> {
    // `<old> <new> <ref>\0<caps>`; capabilities ride on the first command.
    let line = match data.iter().position(|&b| b == 0) {
        Some(nul) => &data[..nul],
        None => data,
    };
    let line = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::Protocol("command line is not UTF-8".into()))?
        .trim_end_matches('\n');

    let mut parts = line.splitn(3, ' ');
    let (old, new, name) = match (parts.next(), parts.next(), parts.next()) {
        (Some(old), Some(new), Some(name)) if !name.is_empty() => (old, new, name),
        _ => {
            return Err(ProtocolError::Protocol(format!(
                "malformed ref-update command: {:?}",
                line
            )))
        }
    };

    Ok(RefUpdate {
        old: ObjectId::from_hex(old)?,
        new: ObjectId::from_hex(new)?,
        name: name.to_string(),
    })
}

/// Renders a push request body: command lines (the first carrying the
/// capabilities), a flush, then the raw pack bytes.
pub fn build_push_request(updates: &[RefUpdate], pack: &[u8]) -> Result<Vec<u8>> {
    let mut writer = PktWriter::new();
    for (i, update) in updates.iter().enumerate() {
        let line = if i == 0 {
            format!(
                "{} {} {}\0report-status ofs-delta",
                update.old, update.new, update.name
            )
        } else {
            format!("{} {} {}", update.old, update.new, update.name)
        };
        writer.line(&line);
    }
    writer.flush();

    let mut out = writer.finish();
    out.extend_from_slice(pack);
    Ok(out)
}

/// Parses the receive-pack status report.
pub fn parse_push_response(body: &[u8]) -> Result<ReportStatus> {
    let mut reader = PktReader::new(body);
    let mut report = ReportStatus::default();

    for pkt in reader.section()? {
        let line = match pkt.as_text() {
            Some(line) => line,
            None => continue,
        };
        if line == "unpack ok" {
            report.unpack_ok = true;
        } else if let Some(rest) = line.strip_prefix("unpack ") {
            return Err(ProtocolError::Remote(format!("unpack failed: {}", rest)));
        } else if let Some(name) = line.strip_prefix("ok ") {
            report.refs.push((name.to_string(), None));
        } else if let Some(rest) = line.strip_prefix("ng ") {
            let (name, reason) = rest.split_once(' ').unwrap_or((rest, "rejected"));
            report
                .refs
                .push((name.to_string(), Some(reason.to_string())));
        }
    }
    Ok(report)
}
