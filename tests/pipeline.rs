//! End-to-end push processing against a fake GitHub and a fake analysis
//! server, both served by axum on ephemeral ports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde_json::{json, Value};

use commitlens::config::{AnalysisConfig, GithubConfig};
use commitlens::forward::AnalysisForwarder;
use commitlens::github::GithubClient;
use commitlens::pipeline::{process_push_event, CommitOutcome, PipelineContext};
use commitlens::source::DirectSource;

#[derive(Clone, Default)]
struct Recorded {
    content_requests: Arc<Mutex<Vec<String>>>,
    raw_requests: Arc<Mutex<Vec<String>>>,
    analyzed: Arc<Mutex<Vec<Value>>>,
}

fn encode_wrapped(bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    encoded
        .as_bytes()
        .chunks(60)
        .map(|line| format!("{}\n", String::from_utf8_lossy(line)))
        .collect()
}

async fn commit_detail(Path((_owner, _repo, sha)): Path<(String, String, String)>) -> Json<Value> {
    let files = match sha.as_str() {
        "abc123" => json!([
            {"filename": "src/app.py", "status": "added", "additions": 3},
            {"filename": "old/legacy.py", "status": "removed"},
            {"filename": "assets/logo.png", "status": "added"},
            {"filename": "docs/empty.md", "status": "added"}
        ]),
        "gone" => json!([{"filename": "a.py", "status": "removed"}]),
        "big1" => json!([
            {"filename": "big/data.txt", "status": "added"},
            {"filename": "lfs/model.txt", "status": "modified"}
        ]),
        _ => json!([]),
    };
    Json(json!({"sha": sha, "files": files}))
}

async fn contents(
    State(recorded): State<Recorded>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let path = path.trim_start_matches('/').to_string();
    recorded
        .content_requests
        .lock()
        .unwrap()
        .push(format!("{}@{}", path, query.get("ref").cloned().unwrap_or_default()));

    match path.as_str() {
        "big/data.txt" => {
            return Ok(Json(json!({
                "encoding": "base64",
                "size": 2048,
                "content": encode_wrapped(b"truncated api copy"),
            })))
        }
        "lfs/model.txt" => {
            return Ok(Json(json!({"encoding": "none", "size": 10, "content": ""})))
        }
        _ => {}
    }

    let bytes: &[u8] = match path.as_str() {
        "src/app.py" => b"import os\n\nclass Greeter:\n    def greet(self):\n        return 'hi'\n",
        "assets/logo.png" => &[0x89, 0x50, 0x4e, 0x47, 0xff, 0xfe],
        "docs/empty.md" => b"",
        _ => return Err(StatusCode::NOT_FOUND),
    };
    Ok(Json(json!({
        "encoding": "base64",
        "size": bytes.len(),
        "content": encode_wrapped(bytes),
    })))
}

async fn raw(
    State(recorded): State<Recorded>,
    Path((owner, repo, git_ref, path)): Path<(String, String, String, String)>,
) -> String {
    let path = path.trim_start_matches('/').to_string();
    recorded
        .raw_requests
        .lock()
        .unwrap()
        .push(format!("{}/{}/{}/{}", owner, repo, git_ref, path));
    format!("raw text of {}\n", path)
}

async fn analyze(State(recorded): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    recorded.analyzed.lock().unwrap().push(body);
    Json(json!({"status": "ok"}))
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn setup() -> (PipelineContext, Recorded) {
    setup_with_threshold(GithubConfig::default().large_file_threshold).await
}

async fn setup_with_threshold(large_file_threshold: u64) -> (PipelineContext, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/repos/{owner}/{repo}/commits/{sha}", get(commit_detail))
        .route("/repos/{owner}/{repo}/contents/{*path}", get(contents))
        .route("/raw/{owner}/{repo}/{git_ref}/{*path}", get(raw))
        .route("/analyze_commit", post(analyze))
        .with_state(recorded.clone());
    let base = spawn(app).await;

    let github = GithubClient::new(&GithubConfig {
        api_base: base.clone(),
        raw_base: format!("{}/raw", base),
        large_file_threshold,
        ..GithubConfig::default()
    })
    .unwrap();
    let forwarder = AnalysisForwarder::new(&AnalysisConfig {
        url: base,
        ..AnalysisConfig::default()
    })
    .unwrap();

    let ctx = PipelineContext {
        source: Arc::new(DirectSource::new(Arc::new(github))),
        sink: Some(Arc::new(forwarder)),
        matcher: None,
    };
    (ctx, recorded)
}

#[tokio::test]
async fn push_is_fetched_and_forwarded() {
    let (ctx, recorded) = setup().await;
    let payload = json!({
        "repository": {"full_name": "acme/widgets"},
        "commits": [{
            "id": "abc123",
            "message": "REQ-12 greeter",
            "author": {"name": "Ada", "email": "ada@example.com"}
        }]
    });

    let reports = process_push_event(&ctx, &payload).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, CommitOutcome::Processed);
    assert!(reports[0].forwarded);
    assert_eq!(reports[0].fetched_files, vec!["src/app.py"]);

    let requests = recorded.content_requests.lock().unwrap().clone();
    assert!(requests.contains(&"src/app.py@abc123".to_string()));
    assert!(!requests.iter().any(|r| r.starts_with("old/legacy.py")));

    let analyzed = recorded.analyzed.lock().unwrap();
    assert_eq!(analyzed.len(), 1);
    let body = &analyzed[0];
    assert_eq!(body["sha"], "abc123");
    assert_eq!(body["author"], "Ada");
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["requirement_ref"], "12");
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
    assert_eq!(body["files"][0]["fileName"], "src/app.py");
    assert_eq!(body["files"][0]["language"], "Python");
    assert!(body["files"][0]["code"]
        .as_str()
        .unwrap()
        .contains("class Greeter"));
}

#[tokio::test]
async fn all_removed_commit_is_not_forwarded() {
    let (ctx, recorded) = setup().await;
    let payload = json!({
        "repository": {"full_name": "acme/widgets"},
        "commits": [{"id": "gone"}]
    });

    let reports = process_push_event(&ctx, &payload).await;
    assert_eq!(reports[0].outcome, CommitOutcome::NoContent);
    assert!(recorded.content_requests.lock().unwrap().is_empty());
    assert!(recorded.analyzed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn commit_without_files_is_reported() {
    let (ctx, recorded) = setup().await;
    let payload = json!({
        "repository": {"full_name": "acme/widgets"},
        "commits": [],
        "head_commit": {"id": "empty1"}
    });

    let reports = process_push_event(&ctx, &payload).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, CommitOutcome::NoFiles);
    assert!(recorded.analyzed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_repository_fails_only_that_commit() {
    let (ctx, recorded) = setup().await;
    let github = GithubClient::new(&GithubConfig {
        api_base: "http://127.0.0.1:9".to_string(),
        ..GithubConfig::default()
    })
    .unwrap();
    let broken = PipelineContext {
        source: Arc::new(DirectSource::new(Arc::new(github))),
        ..ctx.clone()
    };
    let payload = json!({
        "repository": {"full_name": "acme/widgets"},
        "commits": [{"id": "abc123"}]
    });

    let reports = process_push_event(&broken, &payload).await;
    assert_eq!(reports[0].outcome, CommitOutcome::FetchFailed);

    let reports = process_push_event(&ctx, &payload).await;
    assert_eq!(reports[0].outcome, CommitOutcome::Processed);
    assert_eq!(recorded.analyzed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn large_and_unencoded_files_come_from_the_raw_endpoint() {
    let (ctx, recorded) = setup_with_threshold(1024).await;
    let payload = json!({
        "repository": {"full_name": "acme/widgets"},
        "commits": [{"id": "big1"}]
    });

    let reports = process_push_event(&ctx, &payload).await;
    assert_eq!(reports[0].outcome, CommitOutcome::Processed);
    assert_eq!(
        reports[0].fetched_files,
        vec!["big/data.txt", "lfs/model.txt"]
    );

    let mut raw = recorded.raw_requests.lock().unwrap().clone();
    raw.sort();
    assert_eq!(
        raw,
        vec![
            "acme/widgets/big1/big/data.txt",
            "acme/widgets/big1/lfs/model.txt"
        ]
    );

    let analyzed = recorded.analyzed.lock().unwrap();
    let files = analyzed[0]["files"].as_array().unwrap();
    assert_eq!(files[0]["code"], "raw text of big/data.txt\n");
    assert_eq!(files[1]["code"], "raw text of lfs/model.txt\n");
}
