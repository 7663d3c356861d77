//! HTTP surface: shared state, routes and middleware.

use axum::{Router, routing::get};
use std::path::Path;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{MakeSpan, TraceLayer},
};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::handlers;
use crate::metrics::RelayMetrics;
use crate::relay::Relay;

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub metrics: Arc<RelayMetrics>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        let metrics = Arc::new(RelayMetrics::new());
        Self {
            relay: Relay::new(config, metrics.clone()),
            metrics,
        }
    }
}

/// Tags every request span with a fresh request id.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// Build the relay router. Paths other than the API routes are served from
/// `static_dir` when one is configured.
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/ws", get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state);

    match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    }
}
