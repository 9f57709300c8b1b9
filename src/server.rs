//! HTTP boundary between the coordinator and its client contexts.
//!
//! The UI and the extraction context talk to the coordinator over a small
//! JSON API. Router messages keep the same `{ "action": ... }` envelope
//! they use in-process.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/messages` | Any router request; `204` for `contentExtracted` |
//! | `POST` | `/navigation` | Navigation-completion event into the capture gate |
//! | `POST` | `/page-loaded` | Delayed load-time capture trigger |
//! | `GET`  | `/extract/pending` | Drain queued `extractContent` requests |
//! | `GET`  | `/status` | Mirroring counters |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Malformed bodies are rejected by the JSON extractor before they reach
//! the router. Once a request is accepted, the router always answers; a
//! failure inside it comes back as `200` with `{ "error": "..." }`, the
//! same shape the in-process caller sees.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-hosted
//! contexts can call the coordinator directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::capture::{ExtractRequest, NavigationEvent};
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::forward::ForwardStatus;
use crate::router::Request;

/// Starts the coordinator HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let coordinator = Coordinator::open(config).await?;
    let bind_addr = config.server.bind.clone();

    let app = build_app(coordinator);

    info!(bind = %bind_addr, "coordinator listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router without binding, so tests can serve it on any port.
pub fn build_app(coordinator: Coordinator) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/messages", post(handle_message))
        .route("/navigation", post(handle_navigation))
        .route("/page-loaded", post(handle_page_loaded))
        .route("/extract/pending", get(handle_pending_extractions))
        .route("/status", get(handle_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(coordinator)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /messages ============

async fn handle_message(
    State(coordinator): State<Coordinator>,
    Json(request): Json<Request>,
) -> Response {
    match coordinator.router.handle(request).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// ============ POST /navigation ============

#[derive(Serialize)]
struct GateResponse {
    decision: String,
}

async fn handle_navigation(
    State(coordinator): State<Coordinator>,
    Json(event): Json<NavigationEvent>,
) -> Json<GateResponse> {
    let decision = coordinator.gate.on_navigation(&event).await;
    Json(GateResponse {
        decision: format!("{:?}", decision),
    })
}

// ============ POST /page-loaded ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageLoaded {
    tab_id: u64,
    url: String,
}

/// Schedules the delayed trigger and returns immediately.
async fn handle_page_loaded(
    State(coordinator): State<Coordinator>,
    Json(body): Json<PageLoaded>,
) -> StatusCode {
    drop(coordinator.gate.on_page_loaded(body.tab_id, body.url));
    StatusCode::ACCEPTED
}

// ============ GET /extract/pending ============

#[derive(Serialize)]
struct PendingResponse {
    requests: Vec<ExtractRequest>,
}

async fn handle_pending_extractions(
    State(coordinator): State<Coordinator>,
) -> Json<PendingResponse> {
    Json(PendingResponse {
        requests: coordinator.extractions.drain(),
    })
}

// ============ GET /status ============

async fn handle_status(State(coordinator): State<Coordinator>) -> Json<ForwardStatus> {
    Json(coordinator.router.forwarder().status())
}
