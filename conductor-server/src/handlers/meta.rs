//! Diagnostics: version, health, and Prometheus exposition.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::AppState;

/// `GET /v1/version`
pub async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "name": "conductor",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /v1/health` and `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    // Gauges owned by other subsystems are sampled at scrape time.
    state
        .metrics
        .debug_sessions_active
        .set(state.sessions.cached_session_count() as i64);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}
