use axum::{Json, extract::State, response::IntoResponse};

use crate::metrics;
use crate::server::AppState;

/// Health check endpoint - returns relay status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let peers = state.relay.directory().len().await as u64;
    let snapshot = state.metrics.snapshot();

    Json(metrics::HealthStatus {
        status: "healthy".to_string(),
        peers,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Metrics endpoint - returns the full counter snapshot
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
