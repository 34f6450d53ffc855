//! HTTP surface tests: `/health`, `/metrics`, and `/metrics/prom` wired
//! through the real router, plus config load/override behavior exercised
//! the way the binary exercises it (env vars, JSON overrides).

mod test_helpers;

use signal_fish_server::config::SecurityConfig;
use signal_fish_server::land::LandRuntimeConfig;
use test_helpers::{start_test_server, start_test_server_with_security};

#[tokio::test]
async fn health_check_reports_ok() {
    let server = start_test_server(LandRuntimeConfig::default()).await;
    let response = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .expect("request health");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn metrics_endpoint_returns_json_snapshot_when_auth_disabled() {
    let server = start_test_server(LandRuntimeConfig::default()).await;
    let response = reqwest::get(format!("http://{}/metrics", server.addr))
        .await
        .expect("request metrics");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert!(body.get("connections").is_some());
    assert!(body.get("lands").is_some());
    assert!(body.get("joins").is_some());
    assert!(body.get("sync").is_some());
}

#[tokio::test]
async fn prometheus_endpoint_returns_text_exposition() {
    let server = start_test_server(LandRuntimeConfig::default()).await;
    let response = reqwest::get(format!("http://{}/metrics/prom", server.addr))
        .await
        .expect("request prometheus metrics");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn metrics_endpoint_requires_bearer_token_when_auth_enabled() {
    let security = SecurityConfig {
        require_metrics_auth: true,
        metrics_auth_token: Some("shared-secret".to_string()),
        ..SecurityConfig::default()
    };
    let server = start_test_server_with_security(LandRuntimeConfig::default(), security).await;

    let client = reqwest::Client::new();

    let unauthenticated = client
        .get(format!("http://{}/metrics", server.addr))
        .send()
        .await
        .expect("request without auth");
    assert_eq!(unauthenticated.status(), reqwest::StatusCode::UNAUTHORIZED);

    let wrong_token = client
        .get(format!("http://{}/metrics", server.addr))
        .bearer_auth("wrong-token")
        .send()
        .await
        .expect("request with wrong token");
    assert_eq!(wrong_token.status(), reqwest::StatusCode::UNAUTHORIZED);

    let authenticated = client
        .get(format!("http://{}/metrics", server.addr))
        .bearer_auth("shared-secret")
        .send()
        .await
        .expect("request with correct token");
    assert_eq!(authenticated.status(), reqwest::StatusCode::OK);
}

#[test]
fn land_runtime_config_default_matches_documented_defaults() {
    let cfg = LandRuntimeConfig::default();
    assert!(!cfg.enable_legacy_join);
    assert!(!cfg.enable_dirty_tracking);
    assert!(!cfg.create_guest_session);
    assert!(cfg.expected_schema_hash.is_none());
    assert!(cfg.path_hashes.is_none());
}

#[test]
fn config_defaults_round_trip_through_json() {
    let config = test_helpers::test_config_defaults();
    let json = serde_json::to_string(&config).expect("serialize config");
    let reloaded: signal_fish_server::config::Config =
        serde_json::from_str(&json).expect("deserialize config");
    assert_eq!(config.port, reloaded.port);
    assert_eq!(config.server.default_land_type, reloaded.server.default_land_type);
    assert_eq!(config.security.cors_origins, reloaded.security.cors_origins);
}
