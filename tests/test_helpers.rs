//! Shared scaffolding for the integration tests: spins up a real TCP listener
//! running the full HTTP + WebSocket router, backed by a [`Realm`] of
//! [`DemoLandKeeper`] instances, so tests exercise the join/sync protocol
//! end-to-end rather than calling adapter methods directly.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use signal_fish_server::config::{Config, SecurityConfig};
use signal_fish_server::land::{DemoLandKeeperFactory, LandManager, LandRuntimeConfig, Realm};
use signal_fish_server::metrics::ServerMetrics;
use signal_fish_server::websocket::{create_router, AppState, WebSocketTransport};

pub const TEST_LAND_TYPE: &str = "arena";

/// A running test server: HTTP/WS listening on a loopback port, with one
/// land type ("arena") registered against the in-memory demo keeper.
pub struct TestServer {
    pub addr: SocketAddr,
    pub transport: Arc<WebSocketTransport>,
}

impl TestServer {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Starts a test server with the given per-land runtime configuration.
pub async fn start_test_server(land_config: LandRuntimeConfig) -> TestServer {
    let security = SecurityConfig {
        require_metrics_auth: false,
        ..SecurityConfig::default()
    };
    start_test_server_with_security(land_config, security).await
}

pub async fn start_test_server_with_security(
    land_config: LandRuntimeConfig,
    security: SecurityConfig,
) -> TestServer {
    let transport = WebSocketTransport::new();
    let manager = Arc::new(LandManager::new(
        TEST_LAND_TYPE,
        DemoLandKeeperFactory,
        Arc::clone(&transport),
        land_config.clone(),
    ));
    let realm = Realm::new(Arc::clone(&transport));
    let router = realm
        .register_land_type(manager, land_config.enable_legacy_join)
        .expect("register land type");
    transport.set_delegate(router).await;
    realm.run(Duration::from_millis(20), None).await;

    let metrics = Arc::new(ServerMetrics::new());
    let state = Arc::new(AppState {
        transport: Arc::clone(&transport),
        metrics,
        security,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });

    // The demo keeper's sync tick races connection setup by milliseconds;
    // give the listener a moment to actually start accepting.
    tokio::time::sleep(Duration::from_millis(20)).await;

    TestServer { addr, transport }
}

pub fn test_config_defaults() -> Config {
    Config::default()
}
