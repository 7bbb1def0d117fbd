//! Webhook HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Name, version and endpoint list |
//! | `GET`  | `/health` | Readiness of the relay and each service |
//! | `GET`  | `/tools` | Tools of the delegated tool server (404 in direct mode) |
//! | `POST` | `/webhook` | GitHub webhook receiver |
//!
//! # Webhook contract
//!
//! A `push` event whose payload has a `commits` or `head_commit` key is
//! accepted at once and processed in a background task; every other event
//! is acknowledged as ignored. When `server.webhook_secret` is set, the
//! `X-Hub-Signature-256` header must carry the HMAC-SHA256 of the raw body.
//!
//! Errors are returned as `{ "detail": "..." }`:
//! 400 for a body that is not JSON, 401 for a bad signature, 500 otherwise
//! (without internal details).

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tower_http::trace::TraceLayer;

use crate::config::{Config, SourceMode};
use crate::pipeline::{process_push_event, CommitOutcome, PipelineContext};
use crate::relay::RelayManager;
use crate::tool_client::ToolSession;

pub const EVENT_HEADER: &str = "x-github-event";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Everything the handlers share, built once at startup.
#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<Config>,
    pub pipeline: PipelineContext,
    pub relay: Option<Arc<RelayManager>>,
    pub tools: Option<Arc<ToolSession>>,
}

impl ServerContext {
    fn github_ready(&self) -> bool {
        match self.config.source.mode {
            SourceMode::Direct => true,
            SourceMode::Delegated => self.tools.is_some(),
        }
    }
}

pub fn router(ctx: ServerContext) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/tools", get(handle_tools))
        .route("/webhook", post(handle_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve until `shutdown` resolves, then stop the relay and close the tool
/// session. Webhook tasks still running at that point are not cancelled.
pub async fn serve(
    ctx: ServerContext,
    listener: tokio::net::TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let relay = ctx.relay.clone();
    let tools = ctx.tools.clone();

    tracing::info!(addr = %listener.local_addr()?, "Webhook server listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Shutting down webhook server");
    if let Some(relay) = relay {
        relay.stop().await;
    }
    if let Some(tools) = tools {
        tools.close().await;
    }
    tracing::info!("Webhook server shut down");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

fn bad_request(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        detail: detail.into(),
    }
}

fn unauthorized(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        detail: detail.into(),
    }
}

fn not_found(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        detail: detail.into(),
    }
}

fn internal() -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: "Internal server error".to_string(),
    }
}

// ============ GET / and /health ============

async fn handle_root() -> Json<Value> {
    Json(json!({
        "message": "commitlens webhook server is running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "webhook": "/webhook",
            "health": "/health",
            "tools": "/tools"
        }
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    relay_running: bool,
    source: &'static str,
    github_service_ready: bool,
    analysis_ready: bool,
    matcher_ready: bool,
}

async fn handle_health(State(ctx): State<ServerContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        relay_running: ctx.relay.as_ref().is_some_and(|r| r.is_running()),
        source: ctx.config.source.mode.as_str(),
        github_service_ready: ctx.github_ready(),
        analysis_ready: ctx.pipeline.sink.is_some(),
        matcher_ready: ctx.pipeline.matcher.is_some(),
    })
}

async fn handle_tools(State(ctx): State<ServerContext>) -> Result<Json<Value>, AppError> {
    let session = ctx
        .tools
        .as_ref()
        .ok_or_else(|| not_found("No tool server is connected (direct source mode)"))?;
    Ok(Json(json!({ "tools": session.tool_names() })))
}

// ============ POST /webhook ============

async fn handle_webhook(
    State(ctx): State<ServerContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    if let Some(secret) = ctx.config.server.webhook_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !verify_signature(secret, &body, signature) {
            tracing::warn!("Rejected webhook with invalid signature");
            return Err(unauthorized("Invalid signature"));
        }
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|_| {
        tracing::error!("Error decoding webhook payload");
        bad_request("Invalid JSON payload")
    })?;

    let event = match headers.get(EVENT_HEADER) {
        Some(value) => value.to_str().map_err(|e| {
            tracing::error!(error = %e, "Unreadable event header");
            internal()
        })?,
        None => "unknown",
    };
    tracing::info!(event = %event, "Received webhook event");

    let has_commits = payload
        .as_object()
        .is_some_and(|o| o.contains_key("commits") || o.contains_key("head_commit"));

    if event == "push" && has_commits {
        let pipeline = ctx.pipeline.clone();
        tokio::spawn(async move {
            let reports = process_push_event(&pipeline, &payload).await;
            let processed = reports
                .iter()
                .filter(|r| r.outcome == CommitOutcome::Processed)
                .count();
            tracing::info!(
                commits = reports.len(),
                processed,
                "Push event processing finished"
            );
        });
        return Ok(Json(json!({
            "status": "accepted",
            "message": "Push event received and processing started"
        })));
    }

    tracing::info!(event = %event, "Ignoring event");
    Ok(Json(json!({
        "status": "ignored",
        "reason": format!("Not a push event: {}", event)
    })))
}

/// Check `sha256=<hex>` against the HMAC-SHA256 of `body`.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_sig) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `sha256=<hex>` signature for `body`, as GitHub would send it.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
