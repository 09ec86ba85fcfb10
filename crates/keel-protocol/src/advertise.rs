//! Service advertisement (`GET /:repo/info/refs?service=...`).

use crate::{
    PktLine, PktReader, PktWriter, ProtocolError, Result, RECEIVE_CAPABILITIES,
    UPLOAD_CAPABILITIES,
};
use keel_core::ObjectId;
use keel_odb::{Head, RefDatabase};
use keel_storage::Storage;

/// The two smart-HTTP services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Fetch/clone side.
    UploadPack,
    /// Push side.
    ReceivePack,
}

impl Service {
    /// Wire name, e.g. `git-upload-pack`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// Parses the `service` query parameter.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "git-upload-pack" => Ok(Self::UploadPack),
            "git-receive-pack" => Ok(Self::ReceivePack),
            other => Err(ProtocolError::InvalidInput(format!(
                "unknown service: {}",
                other
            ))),
        }
    }

    fn capabilities(&self) -> &'static str {
        match self {
            Self::UploadPack => UPLOAD_CAPABILITIES,
            Self::ReceivePack => RECEIVE_CAPABILITIES,
        }
    }
}

/// Renders the advertisement body for a repository.
pub fn advertise_refs<S: Storage>(refs: &RefDatabase<S>, service: Service) -> Result<Vec<u8>> {
    let mut writer = PktWriter::new();
    writer.line(&format!("# service={}", service.as_str()));
    writer.flush();

    let all = refs.list()?;
    let head = refs.resolve_head()?;
    let caps = service.capabilities();

    let mut rest: &[(String, ObjectId)] = &all;
    if let Some(head_id) = head {
        writer.line(&format!("{} HEAD\0{}", head_id, caps));
    } else if let Some((name, id)) = all.first() {
        writer.line(&format!("{} {}\0{}", id, name, caps));
        rest = &all[1..];
    } else if service == Service::ReceivePack {
        // Empty repository: a capabilities^{} line lets the client create
        // the first refs.
        writer.line(&format!("{} capabilities^{{}}\0{}", ObjectId::ZERO, caps));
    }

    for (name, id) in rest {
        writer.line(&format!("{} {}", id, name));
    }
    writer.flush();
    Ok(writer.finish())
}

/// A parsed advertisement, as seen by a client.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    /// Advertised refs, in wire order. The first entry may be `HEAD`.
    pub refs: Vec<(String, ObjectId)>,
    /// Capabilities carried by the first ref line.
    pub capabilities: Vec<String>,
}

impl Advertisement {
    /// Looks up a ref by name.
    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.refs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Returns the oid advertised for HEAD, if any.
    pub fn head(&self) -> Option<ObjectId> {
        self.get("HEAD")
    }

    /// Returns the branch refs (`refs/heads/*`) as `(branch, oid)` pairs.
    pub fn branches(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.refs.iter().filter_map(|(name, id)| {
            name.strip_prefix("refs/heads/").map(|b| (b, *id))
        })
    }

    /// Returns true when only the capabilities^{} placeholder was sent.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Parses an advertisement body received from a server.
pub fn parse_advertisement(body: &[u8], service: Service) -> Result<Advertisement> {
    let mut reader = PktReader::new(body);

    let header = reader
        .next_packet()?
        .ok_or_else(|| ProtocolError::Protocol("empty advertisement".into()))?;
    let expected = format!("# service={}", service.as_str());
    match header.as_text() {
        Some(text) if text == expected => {}
        other => {
            return Err(ProtocolError::Protocol(format!(
                "bad advertisement header: {:?}",
                other
            )))
        }
    }
    // Flush after the service header.
    match reader.next_packet()? {
        Some(PktLine::Flush) => {}
        _ => return Err(ProtocolError::Protocol("missing flush after service header".into())),
    }

    let mut adv = Advertisement::default();
    for pkt in reader.section()? {
        let data = match pkt.data() {
            Some(d) => d,
            None => continue,
        };
        let (line, caps) = match data.iter().position(|&b| b == 0) {
            Some(nul) => (&data[..nul], Some(&data[nul + 1..])),
            None => (data, None),
        };
        if let Some(caps) = caps {
            adv.capabilities = String::from_utf8_lossy(caps)
                .trim()
                .split(' ')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }

        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches('\n');
        let (oid, name) = line.split_once(' ').ok_or_else(|| {
            ProtocolError::Protocol(format!("malformed ref line: {:?}", line))
        })?;
        if name == "capabilities^{}" {
            continue;
        }
        adv.refs.push((name.to_string(), ObjectId::from_hex(oid)?));
    }
    Ok(adv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::ObjectKind;
    use keel_storage::MemoryStorage;
    use std::sync::Arc;

    fn refs() -> RefDatabase<MemoryStorage> {
        RefDatabase::new(Arc::new(MemoryStorage::new()))
    }

    fn some_id(seed: &[u8]) -> ObjectId {
        ObjectId::hash_object(ObjectKind::Blob, seed)
    }

    #[test]
    fn advertisement_roundtrip() {
        let refs = refs();
        let id = some_id(b"tip");
        refs.write("refs/heads/main", &id).unwrap();
        refs.write("refs/tags/v1", &some_id(b"tag")).unwrap();
        refs.write_head(&Head::Symbolic("refs/heads/main".into()))
            .unwrap();

        let body = advertise_refs(&refs, Service::UploadPack).unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("001e# service=git-upload-pack\n0000"));
        assert!(text.contains("side-band-64k"));

        let adv = parse_advertisement(&body, Service::UploadPack).unwrap();
        assert_eq!(adv.head(), Some(id));
        assert_eq!(adv.get("refs/heads/main"), Some(id));
        assert_eq!(adv.refs.len(), 3);
        assert!(adv.capabilities.iter().any(|c| c == "ofs-delta"));
    }

    #[test]
    fn empty_repo_receive_advertises_placeholder() {
        let refs = refs();
        let body = advertise_refs(&refs, Service::ReceivePack).unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("capabilities^{}"));
        assert!(text.contains("report-status"));

        let adv = parse_advertisement(&body, Service::ReceivePack).unwrap();
        assert!(adv.is_empty());
        assert!(adv.capabilities.iter().any(|c| c == "delete-refs"));
    }

    #[test]
    fn empty_repo_upload_has_no_ref_lines() {
        let refs = refs();
        let body = advertise_refs(&refs, Service::UploadPack).unwrap();
        let adv = parse_advertisement(&body, Service::UploadPack).unwrap();
        assert!(adv.is_empty());
    }

    #[test]
    fn detached_head_advertised_first() {
        let refs = refs();
        let id = some_id(b"detached");
        refs.write_head(&Head::Detached(id)).unwrap();

        let body = advertise_refs(&refs, Service::UploadPack).unwrap();
        let adv = parse_advertisement(&body, Service::UploadPack).unwrap();
        assert_eq!(adv.refs.first().map(|(n, _)| n.as_str()), Some("HEAD"));
        assert_eq!(adv.head(), Some(id));
    }

    #[test]
    fn branches_iterator_strips_prefix() {
        let refs = refs();
        let id = some_id(b"b");
        refs.write("refs/heads/dev", &id).unwrap();
        refs.write("refs/tags/v2", &id).unwrap();

        let body = advertise_refs(&refs, Service::UploadPack).unwrap();
        let adv = parse_advertisement(&body, Service::UploadPack).unwrap();
        let branches: Vec<&str> = adv.branches().map(|(b, _)| b).collect();
        assert_eq!(branches, vec!["dev"]);
    }

    #[test]
    fn service_parse() {
        assert_eq!(Service::parse("git-upload-pack").unwrap(), Service::UploadPack);
        assert_eq!(Service::parse("git-receive-pack").unwrap(), Service::ReceivePack);
        assert!(Service::parse("git-evil-pack").is_err());
    }
}
