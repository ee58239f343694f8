//! HTTP API for playdash.
//!
//! Routes:
//! - `GET  /api/playbooks`      rescan and list playbooks
//! - `POST /api/run`            start a run (`{"playbookName": "..."}`)
//! - `GET  /api/result/{name}`  last result for a playbook
//! - `GET  /api/status`         service health
//! - `GET  /` and `/static/*`   dashboard page and assets, served from disk

mod error;

pub use error::{ApiError, ApiResult};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

use crate::core::config::ServerConfig;
use crate::core::{PlaybookEntry, PlaybookService, RunResult, ServiceStatus};

/// Body of a run request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Name of the playbook to run
    #[serde(default)]
    pub playbook_name: String,
}

/// Acknowledgement returned when a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAccepted {
    /// Always `Started`
    pub status: String,
}

impl RunAccepted {
    fn started() -> Self {
        Self { status: "Started".to_string() }
    }
}

/// State shared across handlers.
#[derive(Clone)]
struct AppState {
    service: PlaybookService,
    index_file: Arc<PathBuf>,
}

/// Build the router for the dashboard.
pub fn router(service: PlaybookService, config: &ServerConfig) -> Router {
    let state = AppState { service, index_file: Arc::new(config.index_file.clone()) };

    Router::new()
        .route("/", get(home).fallback(method_not_allowed))
        .route("/api/playbooks", get(list_playbooks).fallback(method_not_allowed))
        .route("/api/run", post(run_playbook).fallback(method_not_allowed))
        .route("/api/result/", get(result_without_name).fallback(method_not_allowed))
        .route("/api/result/{name}", get(get_result).fallback(method_not_allowed))
        .route("/api/status", get(status).fallback(method_not_allowed))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C.
///
/// Failing to bind is returned as an error; everything after that is logged.
pub async fn serve(service: PlaybookService, config: &ServerConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(%addr, playbooks_dir = %service.playbooks_dir().display(), "Starting server");

    axum::serve(listener, router(service, config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn home(State(state): State<AppState>) -> ApiResult<Html<String>> {
    tokio::fs::read_to_string(state.index_file.as_path()).await.map(Html).map_err(|e| {
        tracing::warn!(path = %state.index_file.display(), error = %e, "Failed to read index page");
        ApiError::Template
    })
}

async fn list_playbooks(State(state): State<AppState>) -> ApiResult<Json<Vec<PlaybookEntry>>> {
    let service = state.service.clone();
    let entries = tokio::task::spawn_blocking(move || service.list_playbooks())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(entries))
}

async fn run_playbook(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<RunAccepted>> {
    let request: RunRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Malformed run request");
        ApiError::BadRequest
    })?;

    // Detached: the run records its own result.
    let _handle = state.service.trigger_run(&request.playbook_name)?;
    Ok(Json(RunAccepted::started()))
}

async fn get_result(State(state): State<AppState>, Path(name): Path<String>) -> Json<RunResult> {
    Json(state.service.result(&name))
}

async fn result_without_name() -> ApiError {
    ApiError::NameRequired
}

async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.service.status())
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
