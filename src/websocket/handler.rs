//! WebSocket upgrade entry point: accepts the HTTP upgrade, mints a session
//! and client id, and hands the live socket to the transport.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;

use crate::land::ids::{ClientId, SessionId};

use super::routes::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let session = SessionId::new(uuid::Uuid::new_v4().to_string());
    let client_id = ClientId::generate();

    state.metrics.increment_connections();
    tracing::debug!(%session, %client_id, %addr, "accepted websocket upgrade");

    let transport = Arc::clone(&state.transport);
    ws.on_upgrade(move |socket| async move {
        transport.serve_connection(socket, session, client_id).await;
        state.metrics.decrement_active_connections();
    })
}
