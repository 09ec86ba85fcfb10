//! Smart-HTTP transport on reqwest.

use keel_core::ObjectId;
use keel_protocol::{
    build_fetch_request, build_push_request, parse_advertisement, parse_fetch_response,
    parse_push_response, Advertisement, RefUpdate, ReportStatus, Service,
};
use keel_repo::{parse_remote_url, RepoError, Transport};
use reqwest::blocking::Client;
use std::time::Duration;

/// A smart-HTTP peer at `<base>/<repo>`.
pub struct HttpTransport {
    base: String,
    repo: String,
    http: Client,
}

impl HttpTransport {
    /// Builds a transport from a remote URL like
    /// `http://host:8080/name[.git]`.
    pub fn from_url(url: &str) -> keel_repo::Result<Self> {
        let (base, repo) = parse_remote_url(url)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RepoError::Transport(e.to_string()))?;
        Ok(Self { base, repo, http })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{}/{}", self.base, self.repo, suffix)
    }

    fn post(&self, suffix: &str, content_type: &str, body: Vec<u8>) -> keel_repo::Result<Vec<u8>> {
        let url = self.endpoint(suffix);
        let response = self
            .http
            .post(&url)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .map_err(|e| RepoError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::Transport(format!(
                "{} returned {}",
                url, status
            )));
        }
        Ok(response
            .bytes()
            .map_err(|e| RepoError::Transport(e.to_string()))?
            .to_vec())
    }
}

impl Transport for HttpTransport {
    fn discover_refs(&self, service: Service) -> keel_repo::Result<Advertisement> {
        let url = format!(
            "{}?service={}",
            self.endpoint("info/refs"),
            service.as_str()
        );
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|e| RepoError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::Transport(format!(
                "{} returned {}",
                url, status
            )));
        }
        let body = response
            .bytes()
            .map_err(|e| RepoError::Transport(e.to_string()))?;
        Ok(parse_advertisement(&body, service)?)
    }

    fn fetch_pack(&self, wants: &[ObjectId], haves: &[ObjectId]) -> keel_repo::Result<Vec<u8>> {
        let request = build_fetch_request(wants, haves)?;
        let response = self.post(
            "git-upload-pack",
            "application/x-git-upload-pack-request",
            request,
        )?;
        Ok(parse_fetch_response(&response)?)
    }

    fn send_pack(&self, updates: &[RefUpdate], pack: &[u8]) -> keel_repo::Result<ReportStatus> {
        let request = build_push_request(updates, pack)?;
        let response = self.post(
            "git-receive-pack",
            "application/x-git-receive-pack-request",
            request,
        )?;
        Ok(parse_push_response(&response)?)
    }
}
