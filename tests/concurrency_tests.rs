//! Concurrency tests: many sessions joining and acting on the same land at
//! once, checked against the gateway's real per-session state rather than
//! adapter internals.

mod test_helpers;

use std::time::Duration;

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use signal_fish_server::land::LandRuntimeConfig;
use test_helpers::start_test_server;

fn join_frame(request_id: &str, player_id: &str, instance_id: Option<&str>) -> Message {
    let mut data = json!({ "requestId": request_id, "landType": "arena", "playerId": player_id });
    if let Some(instance_id) = instance_id {
        data["landInstanceId"] = json!(instance_id);
    }
    let frame = json!({ "type": "join", "data": data });
    Message::Text(frame.to_string().into())
}

fn action_frame(request_id: &str, payload: &Value) -> Message {
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload.to_string());
    let frame = json!({
        "type": "action",
        "data": {
            "requestId": request_id,
            "typeIdentifier": "setPosition",
            "payload": encoded,
        }
    });
    Message::Text(frame.to_string().into())
}

async fn recv_json(
    socket: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid json frame"),
            Message::Binary(bytes) => {
                return serde_json::from_slice(&bytes).expect("valid json frame")
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Skips any frame that isn't an enveloped `TransportMessage` (i.e. skips the
/// bare `{"kind": ...}` state-update frames periodic sync ticks can emit).
async fn recv_envelope(
    socket: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    loop {
        let frame = recv_json(socket).await;
        if frame.get("type").is_some() {
            return frame;
        }
    }
}

type TestSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Joins a fresh land instance (no instance id given) and returns the socket
/// plus the instance id the gateway generated, so other sessions can target
/// the same land explicitly.
async fn join_fresh_land(ws_url: &str, player_id: &str) -> (TestSocket, String) {
    let (mut socket, _) = tokio_tungstenite::connect_async(ws_url).await.expect("connect");
    socket
        .send(join_frame("r0", player_id, None))
        .await
        .expect("send join");
    let response = recv_envelope(&mut socket).await;
    assert_eq!(response["data"]["success"], json!(true));
    let instance_id = response["data"]["landInstanceId"]
        .as_str()
        .expect("land instance id")
        .to_string();
    let _first_sync = recv_json(&mut socket).await;
    (socket, instance_id)
}

#[tokio::test]
async fn many_players_can_join_the_same_land_concurrently() {
    let server = start_test_server(LandRuntimeConfig {
        enable_legacy_join: true,
        ..LandRuntimeConfig::default()
    })
    .await;

    let (_first_socket, instance_id) = join_fresh_land(&server.ws_url(), "player-0").await;

    let players: Vec<String> = (1..12).map(|i| format!("player-{i}")).collect();
    let mut joins = Vec::new();
    for player in &players {
        let url = server.ws_url();
        let player = player.clone();
        let instance_id = instance_id.clone();
        joins.push(tokio::spawn(async move {
            let (mut socket, _) = tokio_tungstenite::connect_async(url).await.expect("connect");
            socket
                .send(join_frame("r1", &player, Some(&instance_id)))
                .await
                .expect("send join");
            let response = recv_envelope(&mut socket).await;
            assert_eq!(response["data"]["success"], json!(true));
            assert_eq!(response["data"]["landInstanceId"], json!(instance_id));
            socket
        }));
    }

    let mut sockets = Vec::new();
    for handle in joins {
        sockets.push(handle.await.expect("join task panicked"));
    }
    assert_eq!(sockets.len(), players.len());
    // +1 for the session that created the land.
    assert_eq!(server.transport.connection_count(), players.len() + 1);
}

#[tokio::test]
async fn concurrent_actions_from_different_players_are_all_applied() {
    let server = start_test_server(LandRuntimeConfig {
        enable_legacy_join: true,
        ..LandRuntimeConfig::default()
    })
    .await;

    let (first_socket, instance_id) = join_fresh_land(&server.ws_url(), "p0").await;
    let mut sockets = vec![first_socket];
    for i in 1..6 {
        let (mut socket, _) = tokio_tungstenite::connect_async(server.ws_url())
            .await
            .expect("connect");
        socket
            .send(join_frame("r1", &format!("p{i}"), Some(&instance_id)))
            .await
            .expect("send join");
        let _join_response = recv_envelope(&mut socket).await;
        let _first_sync = recv_json(&mut socket).await;
        sockets.push(socket);
    }

    let mut tasks = Vec::new();
    for (i, mut socket) in sockets.into_iter().enumerate() {
        tasks.push(tokio::spawn(async move {
            socket
                .send(action_frame("a1", &json!({"x": i as f64, "y": i as f64})))
                .await
                .expect("send action");
            let response = recv_envelope(&mut socket).await;
            assert_eq!(response["data"]["requestId"], json!("a1"));
            assert_eq!(
                response["data"]["response"],
                json!({"x": i as f64, "y": i as f64})
            );
        }));
    }

    for task in tasks {
        task.await.expect("action task panicked");
    }
}
