//! Route table and handlers.

use crate::{AppState, ServerError};
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use keel_core::AbortSignal;
use keel_protocol::{advertise_refs, handle_receive_pack, handle_upload_pack, Service};
use std::collections::HashMap;
use tower_http::trace::TraceLayer;

/// Builds the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/{repo}/HEAD", get(get_head))
        .route("/{repo}/info/refs", get(info_refs))
        .route("/{repo}/git-upload-pack", post(upload_pack))
        .route("/{repo}/git-receive-pack", post(receive_pack))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The path segment accepts an optional `.git` suffix.
fn repo_name(raw: &str) -> &str {
    raw.strip_suffix(".git").unwrap_or(raw)
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Not Found" })),
    )
        .into_response()
}

async fn get_head(
    State(state): State<AppState>,
    Path(repo): Path<String>,
) -> Result<Response, ServerError> {
    let name = repo_name(&repo);
    let handle = state
        .repos
        .get(name)
        .ok_or_else(|| ServerError::NotFound(name.to_string()))?;

    let content = {
        let repo = handle.lock();
        repo.refs().read_head()?.to_content()
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(content))
        .map_err(|e| ServerError::Internal(e.to_string()))?)
}

async fn info_refs(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ServerError> {
    let name = repo_name(&repo);
    let service = params
        .get("service")
        .ok_or_else(|| ServerError::BadRequest("missing service parameter".into()))?;
    let service = Service::parse(service)?;

    // A push against a repository that does not exist yet starts with this
    // advertisement, so the receive side creates on demand.
    let handle = match service {
        Service::ReceivePack => state.repos.get_or_create(name)?,
        Service::UploadPack => state
            .repos
            .get(name)
            .ok_or_else(|| ServerError::NotFound(name.to_string()))?,
    };

    let body = {
        let repo = handle.lock();
        advertise_refs(repo.refs(), service)?
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("application/x-{}-advertisement", service.as_str()),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))
        .map_err(|e| ServerError::Internal(e.to_string()))?)
}

async fn upload_pack(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    body: Bytes,
) -> Result<Response, ServerError> {
    let name = repo_name(&repo);
    let handle = state
        .repos
        .get(name)
        .ok_or_else(|| ServerError::NotFound(name.to_string()))?;

    let abort = AbortSignal::new();
    let output = {
        let repo = handle.lock();
        handle_upload_pack(&body, repo.objects(), &abort)?
    };

    tracing::info!(repo = %name, bytes = output.len(), "upload-pack served");
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-git-upload-pack-result")
        .body(Body::from(output))
        .map_err(|e| ServerError::Internal(e.to_string()))?)
}

async fn receive_pack(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    body: Bytes,
) -> Result<Response, ServerError> {
    let name = repo_name(&repo);
    let handle = state.repos.get_or_create(name)?;

    let abort = AbortSignal::new();
    let output = {
        let repo = handle.lock();
        handle_receive_pack(&body, repo.objects(), repo.refs(), &abort)?
    };

    tracing::info!(repo = %name, "receive-pack applied");
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "application/x-git-receive-pack-result",
        )
        .body(Body::from(output))
        .map_err(|e| ServerError::Internal(e.to_string()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use keel_core::{AbortSignal, ObjectId, Signature};
    use keel_odb::ObjectDatabase;
    use keel_pack::parse_pack;
    use keel_protocol::{
        build_fetch_request, build_push_request, parse_advertisement, parse_fetch_response,
        parse_push_response, RefUpdate,
    };
    use keel_repo::{RepoConfig, Repository};
    use keel_storage::MemoryStorage;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn sig() -> Signature {
        Signature::new("Test", "t@t.com", 0, "+0000")
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Vec<u8>,
    ) -> (StatusCode, Vec<u8>) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404() {
        let router = create_router(AppState::new());
        let (status, body) = send(&router, "GET", "/nope", Vec::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, br#"{"message":"Not Found"}"#);
    }

    #[tokio::test]
    async fn head_of_missing_repo_is_404() {
        let router = create_router(AppState::new());
        let (status, _) = send(&router, "GET", "/ghost/HEAD", Vec::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_of_fresh_repo_is_symbolic_main() {
        let state = AppState::new();
        state.repos.get_or_create("demo").unwrap();
        let router = create_router(state);

        let (status, body) = send(&router, "GET", "/demo/HEAD", Vec::new()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ref: refs/heads/main\n");
    }

    #[tokio::test]
    async fn info_refs_requires_known_service() {
        let state = AppState::new();
        state.repos.get_or_create("demo").unwrap();
        let router = create_router(state);

        let (status, _) = send(
            &router,
            "GET",
            "/demo/info/refs?service=git-evil-pack",
            Vec::new(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, "GET", "/demo/info/refs", Vec::new()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn receive_advertisement_creates_the_repo() {
        let router = create_router(AppState::new());
        let (status, body) = send(
            &router,
            "GET",
            "/new/info/refs?service=git-receive-pack",
            Vec::new(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("# service=git-receive-pack"));
        assert!(text.contains("capabilities^{}"));
    }

    /// Seed repo A locally, push it through the router, then run the clone
    /// flow (advertisement + upload-pack) and check the blob bytes match.
    #[tokio::test]
    async fn push_then_clone_through_the_router() {
        let router = create_router(AppState::new());

        // Local repo with one commit.
        let local = Repository::init(MemoryStorage::new(), &RepoConfig::default()).unwrap();
        local.add("hello.txt", b"Hello, World!").unwrap();
        let head = local.commit("Initial commit", &sig()).unwrap();

        // Collect the closure and push it.
        let commit = local.objects().read_commit(&head).unwrap();
        let tree = commit.tree;
        let blob = local
            .objects()
            .read_tree(&tree)
            .unwrap()
            .entry("hello.txt")
            .unwrap()
            .id;
        let pack = keel_pack::write_pack(&[blob, tree, head], local.objects()).unwrap();
        let push_body = build_push_request(
            &[RefUpdate {
                old: ObjectId::ZERO,
                new: head,
                name: "refs/heads/main".into(),
            }],
            &pack,
        )
        .unwrap();

        let (status, body) = send(&router, "POST", "/demo.git/git-receive-pack", push_body).await;
        assert_eq!(status, StatusCode::OK);
        let report = parse_push_response(&body).unwrap();
        assert!(report.is_ok());

        // Clone side: discover, then request a pack for the head.
        let (status, body) = send(
            &router,
            "GET",
            "/demo/info/refs?service=git-upload-pack",
            Vec::new(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let adv = parse_advertisement(&body, Service::UploadPack).unwrap();
        assert_eq!(adv.get("refs/heads/main"), Some(head));

        let fetch_body = build_fetch_request(&[head], &[]).unwrap();
        let (status, body) = send(&router, "POST", "/demo/git-upload-pack", fetch_body).await;
        assert_eq!(status, StatusCode::OK);

        let pack = parse_fetch_response(&body).unwrap();
        let mirror = ObjectDatabase::new(Arc::new(MemoryStorage::new()));
        parse_pack(&pack, &mirror, &AbortSignal::new()).unwrap();
        assert_eq!(
            mirror.read(&blob).unwrap().data.as_ref(),
            b"Hello, World!"
        );
    }

    #[tokio::test]
    async fn head_follows_pushed_branch() {
        let router = create_router(AppState::new());

        let local = Repository::init(MemoryStorage::new(), &RepoConfig::default()).unwrap();
        local.add("f", b"1").unwrap();
        let head = local.commit("c", &sig()).unwrap();
        let commit = local.objects().read_commit(&head).unwrap();
        let blob = local
            .objects()
            .read_tree(&commit.tree)
            .unwrap()
            .entries()[0]
            .id;
        let pack = keel_pack::write_pack(&[blob, commit.tree, head], local.objects()).unwrap();
        let push_body = build_push_request(
            &[RefUpdate {
                old: ObjectId::ZERO,
                new: head,
                name: "refs/heads/main".into(),
            }],
            &pack,
        )
        .unwrap();
        send(&router, "POST", "/repo/git-receive-pack", push_body).await;

        let (_, body) = send(&router, "GET", "/repo/HEAD", Vec::new()).await;
        assert_eq!(body, b"ref: refs/heads/main\n");

        let (status, body) = send(
            &router,
            "GET",
            "/repo/info/refs?service=git-upload-pack",
            Vec::new(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let adv = parse_advertisement(&body, Service::UploadPack).unwrap();
        assert_eq!(adv.head(), Some(head));
    }

    #[tokio::test]
    async fn malformed_push_body_is_400_with_pkt_error() {
        let state = AppState::new();
        state.repos.get_or_create("demo").unwrap();
        let router = create_router(state);

        let mut body = Vec::new();
        body.extend_from_slice(b"0012not a command\n0000");
        let (status, response) = send(&router, "POST", "/demo/git-receive-pack", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        // pkt-line error followed by a flush.
        assert!(response.ends_with(b"0000"));
        assert!(String::from_utf8_lossy(&response).contains("protocol error"));
    }

    #[tokio::test]
    async fn deterministic_commit_over_fresh_repos() {
        // S2: the same single-file commit on fresh repos yields one id.
        let one = Repository::init(MemoryStorage::new(), &RepoConfig::default()).unwrap();
        one.add("README.md", b"# Test Repository").unwrap();
        let a = one.commit("Initial commit", &sig()).unwrap();

        let two = Repository::init(MemoryStorage::new(), &RepoConfig::default()).unwrap();
        two.add("README.md", b"# Test Repository").unwrap();
        let b = two.commit("Initial commit", &sig()).unwrap();

        assert_eq!(a, b);
        assert_eq!(one.refs().read("refs/heads/main").unwrap(), Some(a));
    }
}
