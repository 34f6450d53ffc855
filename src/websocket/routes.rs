//! HTTP route wiring: the WebSocket upgrade endpoint plus health and
//! metrics surfaces, sharing one [`AppState`] across handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;

use crate::config::SecurityConfig;
use crate::metrics::ServerMetrics;

use super::handler::websocket_handler;
use super::metrics::{metrics_handler, prometheus_metrics_handler};
use super::transport::WebSocketTransport;

/// Shared state for every HTTP/WS handler.
pub struct AppState {
    pub transport: Arc<WebSocketTransport>,
    pub metrics: Arc<ServerMetrics>,
    pub security: SecurityConfig,
}

/// Builds the axum router: `/ws` upgrade, `/health`, `/metrics` (JSON),
/// `/metrics/prom` (Prometheus text exposition).
pub fn create_router(state: Arc<AppState>) -> axum::Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let cors_origins = state.security.cors_origins.clone();
    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    axum::Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/prom", get(prometheus_metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> &'static str {
    tracing::trace!(connections = state.transport.connection_count(), "health check");
    "OK"
}
