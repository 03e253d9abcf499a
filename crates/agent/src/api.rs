//! Local HTTP surface: health, status, control, Prometheus metrics
//!
//! Bound to the health check port for operators and orchestration on
//! the host itself. Control routes accept POST only; axum's method
//! routing answers anything else with 405.

use agent_lib::control::ControlState;
use agent_lib::observability::StructuredLogger;
use agent_lib::store::StoreClient;
use agent_lib::AGENT_VERSION;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shared application state
pub struct AppState {
    pub control: Arc<ControlState>,
    pub client: Option<Arc<StoreClient>>,
    pub agent_id: String,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        control: Arc<ControlState>,
        client: Option<Arc<StoreClient>>,
        agent_id: impl Into<String>,
    ) -> Self {
        let agent_id = agent_id.into();
        Self {
            control,
            client,
            logger: StructuredLogger::new(agent_id.clone()),
            agent_id,
        }
    }

    /// Best-effort mirror of a local control transition to the store
    async fn write_remote_status(&self, status: &str) {
        let Some(client) = &self.client else { return };
        let record_id = self.control.record_id().await;
        if record_id.is_empty() {
            return;
        }
        if let Err(err) = client.update_agent_status(&record_id, status).await {
            warn!(error = %err, status, "Failed to mirror control state to store");
        }
    }
}

/// Liveness check; always 200 while the process serves requests
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "agent_id": state.agent_id,
        "version": AGENT_VERSION,
    }))
}

/// Current agent state plus the last built snapshot, if any
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_secs = (Utc::now() - state.control.started_at()).num_seconds();
    Json(json!({
        "agent_id": state.agent_id,
        "monitoring": state.control.is_monitoring().await,
        "interval_secs": state.control.current_interval().await.as_secs(),
        "tasks": state.control.task_count(),
        "uptime_secs": uptime_secs,
        "snapshot": state.control.last_snapshot().await,
    }))
}

async fn control_start(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.control.resume().await {
        state.logger.log_monitoring_resumed("local api");
    }
    state.write_remote_status("running").await;
    Json(json!({ "status": "ok", "monitoring": true }))
}

async fn control_stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.control.pause().await {
        state.logger.log_monitoring_paused("local api");
    }
    state.write_remote_status("paused").await;
    Json(json!({ "status": "ok", "monitoring": false }))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %err, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/control/start", post(control_start))
        .route("/control/stop", post(control_stop))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until the shutdown channel fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting health API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
