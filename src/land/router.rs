//! `LandRouter`: the single `TransportDelegate` registered
//! with `WebSocketTransport`. Tracks which land each session is bound to and
//! dispatches inbound frames to that land's `TransportAdapter`, or runs the
//! join handshake to establish the binding in the first place.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::error::ErrorCode;
use super::ids::{ClientId, LandId, SessionId};
use super::keeper::LandKeeper;
use super::manager::{LandKeeperFactory, LandManager};
use super::transport_adapter::{JoinRequest, TransportAdapter};
use crate::codec::{MessageCodec, MessageEncoding, TransportMessage};
use crate::websocket::transport::{SendTarget, TransportDelegate, WebSocketTransport};

/// Which land (if any) a connected session has bound to, plus enough to
/// re-derive identity on reconnect attempts.
#[derive(Debug, Clone)]
struct SessionBinding {
    client_id: ClientId,
    auth_info: Option<Value>,
    land_id: Option<LandId>,
}

/// Per-land-type configuration a router was constructed with, and the
/// manager it owns once the first instance is requested.
struct RegisteredLandType<K: LandKeeper + 'static, F: LandKeeperFactory<Keeper = K>> {
    manager: Arc<LandManager<K, F>>,
    enable_legacy_join: bool,
}

/// Dispatches across a single land type.
pub struct LandRouter<K: LandKeeper + 'static, F: LandKeeperFactory<Keeper = K>> {
    land_type: RegisteredLandType<K, F>,
    transport: Arc<WebSocketTransport>,
    /// Used only to decode the always-JSON join frame before a land's own
    /// codec is known.
    join_codec: MessageCodec,
    bindings: DashMap<SessionId, SessionBinding>,
}

/// A fresh instance id for a client that joined without naming one.
fn generate_instance_id() -> String {
    format!("{:016x}", fastrand::u64(..))
}

impl<K: LandKeeper + 'static, F: LandKeeperFactory<Keeper = K>> LandRouter<K, F> {
    pub fn new(manager: Arc<LandManager<K, F>>, transport: Arc<WebSocketTransport>, enable_legacy_join: bool) -> Arc<Self> {
        Arc::new(Self {
            land_type: RegisteredLandType {
                manager,
                enable_legacy_join,
            },
            transport,
            join_codec: MessageCodec::new(MessageEncoding::JsonObject),
            bindings: DashMap::new(),
        })
    }

    async fn adapter_for(&self, land_id: &LandId) -> Arc<TransportAdapter<K>> {
        self.land_type.manager.get_or_create_land(&land_id.instance_id).await
    }

    async fn existing_adapter_for(&self, land_id: &LandId) -> Option<Arc<TransportAdapter<K>>> {
        self.land_type.manager.get_land(&land_id.instance_id).await
    }

    async fn handle_join_frame(&self, session: SessionId, client_id: ClientId, message: TransportMessage) {
        let TransportMessage::Join {
            request_id,
            land_type,
            land_instance_id,
            player_id,
            device_id,
            metadata,
            schema_hash,
        } = message
        else {
            return;
        };

        if land_type != self.land_type.manager.land_type() {
            self.send_error(&session, &request_id, ErrorCode::JoinRoomNotFound, "unknown land type").await;
            return;
        }

        let requested_instance_id = land_instance_id.unwrap_or_default();
        if requested_instance_id.is_empty() && !self.land_type.enable_legacy_join {
            self.send_error(&session, &request_id, ErrorCode::JoinRoomNotFound, "an instance id is required").await;
            return;
        }

        // A client-supplied instance id must resolve to a land that already
        // exists; an absent one asks us to spin up a fresh instance.
        let land_id = if requested_instance_id.is_empty() {
            LandId::new(land_type, generate_instance_id())
        } else {
            let requested = LandId::new(land_type.clone(), requested_instance_id);
            if self.existing_adapter_for(&requested).await.is_none() {
                self.send_error(&session, &request_id, ErrorCode::JoinRoomNotFound, "no such land instance").await;
                return;
            }
            requested
        };

        let auth_info = self
            .bindings
            .get(&session)
            .and_then(|b| b.auth_info.clone());

        let adapter = self.adapter_for(&land_id).await;
        // The session's connection is only registered with a specific
        // land's membership coordinator once we know which land it wants
        // to join: `on_connect` here is idempotent from the
        // coordinator's point of view since a session id is only ever
        // used for one join attempt.
        adapter.on_connect(session.clone(), client_id.clone(), auth_info.clone()).await;

        let request = JoinRequest {
            request_id: request_id.clone(),
            requested_player_id: player_id,
            device_id,
            metadata,
            schema_hash,
            auth_info,
        };

        match adapter.join(session.clone(), client_id, request).await {
            Ok(()) => {
                self.bindings.entry(session).and_modify(|b| b.land_id = Some(land_id.clone()));
            }
            Err(err) => {
                self.send_error(&session, &request_id, err.wire_code(), &err.to_string()).await;
            }
        }
    }

    async fn send_error(&self, session: &SessionId, request_id: &str, code: ErrorCode, message: &str) {
        let frame = TransportMessage::JoinResponse {
            request_id: request_id.to_string(),
            success: false,
            land_type: None,
            land_instance_id: None,
            player_slot: None,
            encoding: None,
            reason: Some(format!("{}: {}", code.description(), message)),
        };
        if let Ok(bytes) = self.join_codec.encode(&frame) {
            self.transport.send(SendTarget::Session(session.clone()), bytes, false);
        }
    }

    /// Resolves the land instance a session has already bound to, for stats
    /// and admin surfaces.
    pub fn land_for_session(&self, session: &SessionId) -> Option<LandId> {
        self.bindings.get(session).and_then(|b| b.land_id.clone())
    }

    /// Attaches auth info resolved out-of-band (e.g. by an HTTP upgrade
    /// middleware) before the join handshake runs.
    pub fn set_auth_info(&self, session: &SessionId, auth_info: Value) {
        if let Some(mut binding) = self.bindings.get_mut(session) {
            binding.auth_info = Some(auth_info);
        }
    }
}

#[async_trait]
impl<K: LandKeeper + 'static, F: LandKeeperFactory<Keeper = K>> TransportDelegate for LandRouter<K, F> {
    async fn on_connect(&self, session: SessionId, client_id: ClientId) {
        self.bindings.insert(
            session.clone(),
            SessionBinding {
                client_id: client_id.clone(),
                auth_info: None,
                land_id: None,
            },
        );
    }

    async fn on_message(&self, session: SessionId, frame: Vec<u8>) {
        let client_id = match self.bindings.get(&session) {
            Some(binding) => binding.client_id.clone(),
            None => {
                tracing::debug!(%session, "inbound frame for an unknown session, dropping");
                return;
            }
        };

        let bound_land = self.bindings.get(&session).and_then(|b| b.land_id.clone());
        match bound_land {
            Some(land_id) => match self.existing_adapter_for(&land_id).await {
                Some(adapter) => adapter.on_message(session, frame).await,
                None => {
                    // The bound land was removed (swept empty, or
                    // explicitly torn down) since this session joined it
                    //: reply and drop the stale binding rather
                    // than silently recreating the land under it.
                    self.bindings.remove(&session);
                    self.send_error(&session, "", ErrorCode::JoinRoomNotFound, "the joined land no longer exists").await;
                }
            },
            None => {
                // Not yet joined: a pre-join frame is always JSON
                // regardless of any land's negotiated encoding, so it can be decoded generically
                // before any land is known.
                match self.join_codec.decode(&frame) {
                    Ok(message @ TransportMessage::Join { .. }) => {
                        self.handle_join_frame(session, client_id, message).await;
                    }
                    Ok(_) => {
                        self.send_error(&session, "", ErrorCode::JoinSessionNotConnected, "join before sending other frames").await;
                    }
                    Err(_) => {
                        self.send_error(&session, "", ErrorCode::InvalidMessageFormat, "expected a join frame").await;
                    }
                }
            }
        }
    }

    async fn on_disconnect(&self, session: SessionId, client_id: ClientId) {
        let land_id = self.bindings.remove(&session).and_then(|(_, b)| b.land_id);
        if let Some(land_id) = land_id {
            let adapter = self.adapter_for(&land_id).await;
            adapter.on_disconnect(session, client_id).await;
        }
    }
}

