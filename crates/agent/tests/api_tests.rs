//! Integration tests for the agent API endpoints

use agent_lib::control::ControlState;
use agent_lib::models::{DiskUsage, HostSnapshot, MemoryUsage, NetworkUsage};
use agent_lib::observability::StructuredLogger;
use agent_lib::AGENT_VERSION;
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub struct AppState {
    pub control: Arc<ControlState>,
    pub agent_id: String,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(control: Arc<ControlState>, agent_id: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        Self {
            control,
            logger: StructuredLogger::new(agent_id.clone()),
            agent_id,
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "agent_id": state.agent_id,
        "version": AGENT_VERSION,
    }))
}

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
    Json(json!({ "status": "ok", "monitoring": true }))
}

async fn control_stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.control.pause().await {
        state.logger.log_monitoring_paused("local api");
    }
    Json(json!({ "status": "ok", "monitoring": false }))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/control/start", post(control_start))
        .route("/control/stop", post(control_stop))
        .route("/metrics", get(metrics))
        .with_state(state)
}

fn setup_test_app() -> (Router, Arc<AppState>) {
    let control = Arc::new(ControlState::new(Duration::from_secs(30)));
    let state = Arc::new(AppState::new(control, "agent-1"));
    let router = create_test_router(state.clone());
    (router, state)
}

fn sample_snapshot() -> HostSnapshot {
    HostSnapshot {
        agent_id: "agent-1".to_string(),
        timestamp: Utc::now(),
        cpu_percent: 12.5,
        memory: MemoryUsage {
            used_bytes: 4_000,
            total_bytes: 16_000,
            percent: 25.0,
        },
        disk: DiskUsage {
            used_bytes: 50,
            total_bytes: 200,
            percent: 25.0,
        },
        network: NetworkUsage::default(),
        uptime_secs: 3_600,
        tasks: 3,
        status: "active".to_string(),
    }
}

#[tokio::test]
async fn test_health_returns_identity() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(health["status"], "healthy");
    assert_eq!(health["agent_id"], "agent-1");
    assert_eq!(health["version"], AGENT_VERSION);
    assert!(health["timestamp"].is_string());
}

#[tokio::test]
async fn test_status_before_first_snapshot() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status["monitoring"], true);
    assert_eq!(status["interval_secs"], 30);
    assert!(status["snapshot"].is_null());
}

#[tokio::test]
async fn test_status_serves_cached_snapshot() {
    let (app, state) = setup_test_app();
    state.control.set_snapshot(sample_snapshot()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status["snapshot"]["cpu_percent"], 12.5);
    assert_eq!(status["snapshot"]["status"], "active");
}

#[tokio::test]
async fn test_stop_then_start_flips_monitoring() {
    let (app, state) = setup_test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/control/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!state.control.is_monitoring().await);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/control/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.control.is_monitoring().await);
}

#[tokio::test]
async fn test_control_routes_reject_get() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/control/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (app, _state) = setup_test_app();
    // Touch the registry so at least the agent metrics exist
    let _ = agent_lib::AgentMetrics::new();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}
