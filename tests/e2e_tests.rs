//! End-to-end WebSocket tests: a real client connects over TCP, speaks the
//! join/sync/action protocol against a running gateway, and observes the
//! frames that come back.

mod test_helpers;

use std::time::Duration;

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use signal_fish_server::land::LandRuntimeConfig;
use test_helpers::start_test_server;

fn join_frame(request_id: &str, land_type: &str, player_id: Option<&str>) -> Message {
    let mut data = json!({
        "requestId": request_id,
        "landType": land_type,
    });
    if let Some(player_id) = player_id {
        data["playerId"] = json!(player_id);
    }
    let frame = json!({ "type": "join", "data": data });
    Message::Text(frame.to_string().into())
}

fn action_frame(request_id: &str, type_identifier: &str, payload: &Value) -> Message {
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload.to_string());
    let frame = json!({
        "type": "action",
        "data": {
            "requestId": request_id,
            "typeIdentifier": type_identifier,
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

fn frame_type(frame: &Value) -> &str {
    frame["type"].as_str().expect("frame has a type tag")
}

#[tokio::test]
async fn join_yields_response_then_first_sync() {
    let server = start_test_server(LandRuntimeConfig {
        enable_legacy_join: true,
        ..LandRuntimeConfig::default()
    })
    .await;

    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws_url())
        .await
        .expect("connect");

    socket
        .send(join_frame("r1", "arena", Some("alice")))
        .await
        .expect("send join");

    let response = recv_json(&mut socket).await;
    assert_eq!(frame_type(&response), "joinResponse");
    assert_eq!(response["data"]["requestId"], json!("r1"));
    assert_eq!(response["data"]["success"], json!(true));
    assert_eq!(response["data"]["landType"], json!("arena"));
    assert!(response["data"]["playerSlot"].as_i64().is_some());

    let first_sync = recv_json(&mut socket).await;
    assert_eq!(first_sync["kind"], json!("firstSync"));
    assert!(first_sync["patches"].as_array().is_some());
}

#[tokio::test]
async fn set_position_action_updates_broadcast_snapshot() {
    let server = start_test_server(LandRuntimeConfig {
        enable_legacy_join: true,
        ..LandRuntimeConfig::default()
    })
    .await;

    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws_url())
        .await
        .expect("connect");

    socket
        .send(join_frame("r1", "arena", Some("alice")))
        .await
        .expect("send join");
    let _join_response = recv_json(&mut socket).await;
    let _first_sync = recv_json(&mut socket).await;

    socket
        .send(action_frame("a1", "setPosition", &json!({"x": 3.0, "y": 4.0})))
        .await
        .expect("send action");

    let action_response = recv_json(&mut socket).await;
    assert_eq!(frame_type(&action_response), "actionResponse");
    assert_eq!(action_response["data"]["requestId"], json!("a1"));
    assert_eq!(
        action_response["data"]["response"],
        json!({"x": 3.0, "y": 4.0})
    );
}

#[tokio::test]
async fn duplicate_login_kicks_previous_session() {
    let server = start_test_server(LandRuntimeConfig {
        enable_legacy_join: true,
        ..LandRuntimeConfig::default()
    })
    .await;

    let (mut first, _) = tokio_tungstenite::connect_async(server.ws_url())
        .await
        .expect("connect first");
    first
        .send(join_frame("r1", "arena", Some("alice")))
        .await
        .expect("send first join");
    let _join_response = recv_json(&mut first).await;
    let _first_sync = recv_json(&mut first).await;

    let (mut second, _) = tokio_tungstenite::connect_async(server.ws_url())
        .await
        .expect("connect second");
    second
        .send(join_frame("r2", "arena", Some("alice")))
        .await
        .expect("send second join");
    let _join_response_2 = recv_json(&mut second).await;
    let _first_sync_2 = recv_json(&mut second).await;

    // The first session should have been told it was kicked.
    let kicked = recv_json(&mut first).await;
    assert_eq!(frame_type(&kicked), "error");
    assert_eq!(kicked["data"]["code"], json!("JOIN_ALREADY_JOINED"));
}

#[tokio::test]
async fn unknown_land_type_is_rejected() {
    let server = start_test_server(LandRuntimeConfig {
        enable_legacy_join: true,
        ..LandRuntimeConfig::default()
    })
    .await;

    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws_url())
        .await
        .expect("connect");
    socket
        .send(join_frame("r1", "no-such-land", Some("alice")))
        .await
        .expect("send join");

    let response = recv_json(&mut socket).await;
    assert_eq!(frame_type(&response), "joinResponse");
    assert_eq!(response["data"]["success"], json!(false));
    assert!(response["data"]["reason"].as_str().is_some());
}

#[tokio::test]
async fn joining_without_instance_id_is_rejected_when_legacy_join_disabled() {
    let server = start_test_server(LandRuntimeConfig {
        enable_legacy_join: false,
        ..LandRuntimeConfig::default()
    })
    .await;

    let (mut socket, _) = tokio_tungstenite::connect_async(server.ws_url())
        .await
        .expect("connect");
    socket
        .send(join_frame("r1", "arena", Some("alice")))
        .await
        .expect("send join");

    let response = recv_json(&mut socket).await;
    assert_eq!(frame_type(&response), "joinResponse");
    assert_eq!(response["data"]["success"], json!(false));
}
