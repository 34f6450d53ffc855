//! `/metrics` (JSON) and `/metrics/prom` (Prometheus text) handlers, gated
//! behind an optional shared bearer token.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};

use super::prometheus::render_prometheus_metrics;
use super::routes::AppState;

fn enforce_metrics_auth(headers: &HeaderMap, state: &AppState) -> Result<(), StatusCode> {
    let Some(raw_header) = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()) else {
        tracing::warn!("unauthorized metrics access attempt: missing Authorization header");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let Some(token) = raw_header.strip_prefix("Bearer ") else {
        tracing::warn!("unauthorized metrics access attempt: invalid Authorization scheme");
        return Err(StatusCode::UNAUTHORIZED);
    };

    if let Some(expected) = state.security.metrics_auth_token.as_deref() {
        if token == expected {
            return Ok(());
        }
    }

    tracing::warn!("unauthorized metrics access attempt: token rejected");
    Err(StatusCode::UNAUTHORIZED)
}

/// JSON metrics endpoint: the full snapshot, unwrapped.
pub async fn metrics_handler(
    headers: axum::http::HeaderMap,
    State(state): State<Arc<AppState>>,
) -> axum::response::Result<axum::response::Json<crate::metrics::MetricsSnapshot>> {
    if state.security.require_metrics_auth {
        enforce_metrics_auth(&headers, &state)?;
    }

    Ok(axum::response::Json(state.metrics.snapshot().await))
}

/// Prometheus metrics endpoint (text format, version 0.0.4).
pub async fn prometheus_metrics_handler(
    headers: axum::http::HeaderMap,
    State(state): State<Arc<AppState>>,
) -> axum::response::Result<axum::response::Response> {
    use axum::http::header::{HeaderValue, CONTENT_TYPE};
    use axum::response::IntoResponse;

    if state.security.require_metrics_auth {
        enforce_metrics_auth(&headers, &state)?;
    }

    let snapshot = state.metrics.snapshot().await;
    let body = render_prometheus_metrics(&snapshot);
    let headers = [(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    )];

    Ok((headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::metrics::ServerMetrics;
    use crate::websocket::transport::WebSocketTransport;
    use axum::http::header::AUTHORIZATION;
    use axum::http::HeaderMap;

    fn test_state(security: SecurityConfig) -> AppState {
        AppState {
            transport: WebSocketTransport::new(),
            metrics: Arc::new(ServerMetrics::new()),
            security,
        }
    }

    #[test]
    fn missing_header_rejected() {
        let state = test_state(SecurityConfig {
            require_metrics_auth: true,
            ..SecurityConfig::default()
        });
        let headers = HeaderMap::new();
        assert_eq!(
            enforce_metrics_auth(&headers, &state).unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn accepts_matching_bearer_token() {
        let state = test_state(SecurityConfig {
            require_metrics_auth: true,
            metrics_auth_token: Some("shared-token".to_string()),
            ..SecurityConfig::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer shared-token".parse().unwrap());
        assert!(enforce_metrics_auth(&headers, &state).is_ok());
    }

    #[test]
    fn wrong_token_rejected() {
        let state = test_state(SecurityConfig {
            require_metrics_auth: true,
            metrics_auth_token: Some("correct-token".to_string()),
            ..SecurityConfig::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer wrong-token".parse().unwrap());
        assert_eq!(
            enforce_metrics_auth(&headers, &state).unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn invalid_scheme_rejected() {
        let state = test_state(SecurityConfig {
            require_metrics_auth: true,
            metrics_auth_token: Some("some-token".to_string()),
            ..SecurityConfig::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Basic some-token".parse().unwrap());
        assert_eq!(
            enforce_metrics_auth(&headers, &state).unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }
}
