//! The webhook router, driven in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use commitlens::config::Config;
use commitlens::models::CommitSnapshot;
use commitlens::pipeline::PipelineContext;
use commitlens::server::{router, sign_payload, ServerContext};
use commitlens::source::CommitSource;

/// Reports every fetched sha on a channel and returns an empty commit.
struct ChannelSource {
    seen: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl CommitSource for ChannelSource {
    async fn fetch_commit(&self, _repo: &str, sha: &str) -> Result<Option<CommitSnapshot>> {
        let _ = self.seen.send(sha.to_string());
        Ok(Some(CommitSnapshot::default()))
    }
}

fn context(secret: Option<&str>) -> (ServerContext, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut config = Config::default();
    config.server.webhook_secret = secret.map(str::to_string);
    let ctx = ServerContext {
        config: Arc::new(config),
        pipeline: PipelineContext {
            source: Arc::new(ChannelSource { seen: tx }),
            sink: None,
            matcher: None,
        },
        relay: None,
        tools: None,
    };
    (ctx, rx)
}

fn webhook(event: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json");
    if let Some(event) = event {
        builder = builder.header("X-GitHub-Event", event);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn push_payload() -> String {
    json!({
        "repository": {"full_name": "acme/widgets"},
        "commits": [{"id": "abc123", "message": "REQ-1 add app"}]
    })
    .to_string()
}

#[tokio::test]
async fn push_is_accepted_and_processed_in_background() {
    let (ctx, mut seen) = context(None);
    let response = router(ctx)
        .oneshot(webhook(Some("push"), &push_payload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "accepted");

    let sha = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("background task never fetched the commit");
    assert_eq!(sha.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn other_events_are_ignored() {
    let (ctx, mut seen) = context(None);
    let response = router(ctx)
        .oneshot(webhook(Some("ping"), r#"{"zen":"hi"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ignored");
    assert_eq!(body["reason"], "Not a push event: ping");
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn missing_event_header_reads_as_unknown() {
    let (ctx, _seen) = context(None);
    let response = router(ctx)
        .oneshot(webhook(None, &push_payload()))
        .await
        .unwrap();
    assert_eq!(
        json_body(response).await["reason"],
        "Not a push event: unknown"
    );
}

#[tokio::test]
async fn push_without_commits_is_ignored() {
    let (ctx, _seen) = context(None);
    let body = json!({"repository": {"full_name": "acme/widgets"}}).to_string();
    let response = router(ctx)
        .oneshot(webhook(Some("push"), &body))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["status"], "ignored");
}

#[tokio::test]
async fn invalid_json_is_a_bad_request() {
    let (ctx, _seen) = context(None);
    let response = router(ctx)
        .oneshot(webhook(Some("push"), "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "Invalid JSON payload");
}

#[tokio::test]
async fn signature_is_checked_when_a_secret_is_set() {
    let body = push_payload();

    let (ctx, _seen) = context(Some("s3cret"));
    let response = router(ctx)
        .oneshot(webhook(Some("push"), &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (ctx, mut seen) = context(Some("s3cret"));
    let mut request = webhook(Some("push"), &body);
    request.headers_mut().insert(
        "X-Hub-Signature-256",
        sign_payload("s3cret", body.as_bytes()).parse().unwrap(),
    );
    let response = router(ctx).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sha = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap();
    assert_eq!(sha.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn health_reports_services() {
    let (ctx, _seen) = context(None);
    let response = router(ctx)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["source"], "direct");
    assert_eq!(body["relay_running"], false);
    assert_eq!(body["github_service_ready"], true);
    assert_eq!(body["analysis_ready"], false);
    assert_eq!(body["matcher_ready"], false);
}

#[tokio::test]
async fn root_lists_endpoints() {
    let (ctx, _seen) = context(None);
    let response = router(ctx)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["endpoints"]["webhook"], "/webhook");
}

#[tokio::test]
async fn tools_endpoint_is_not_found_in_direct_mode() {
    let (ctx, _seen) = context(None);
    let response = router(ctx)
        .oneshot(Request::get("/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(json_body(response).await["detail"].is_string());
}
