//! `TransportAdapter`: per-room orchestrator sitting between
//! `WebSocketTransport`/`LandRouter` and one `LandKeeper`. Owns the room's
//! serialized membership domain, the join protocol, and the periodic sync
//! cycle.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::Engine;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::codec::{encode_merged_frame, CodecConfig, LandCodec, StateUpdate, TransportMessage, UpdateScope};
use crate::codec::message::EventBody;
use crate::websocket::transport::{SendTarget, WebSocketTransport};

use super::config::{AutoDirtyTrackingConfig, LandRuntimeConfig};
use super::error::{ErrorCode, LandError};
use super::ids::{ClientId, LandId, MembershipStamp, PlayerId, SessionId};
use super::keeper::{FieldPolicy, JoinError, JoinOutcome, LandKeeper, LandState, PlayerSession};
use super::membership::MembershipCoordinator;
use super::pending_events::{EventTarget, PendingEventManager};
use super::sync_engine::{diff, merge_objects, mode_field_filter, snapshot_mode_for, SyncEngine};

/// Everything a `Join` frame carries once parsed off the wire.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub request_id: String,
    pub requested_player_id: Option<String>,
    pub device_id: Option<String>,
    pub metadata: Option<Value>,
    pub schema_hash: Option<String>,
    pub auth_info: Option<Value>,
}

/// Tracks the EMA-with-hysteresis switch that automatically flips dirty
/// tracking on/off.
struct DirtyTrackingState {
    ema: f64,
    consecutive: u32,
}

impl DirtyTrackingState {
    fn new() -> Self {
        Self {
            ema: 0.0,
            consecutive: 0,
        }
    }

    /// Folds in one sync cycle's changed-field ratio and returns the
    /// (possibly updated) enabled state.
    fn observe(&mut self, enabled: bool, changed_ratio: f64, cfg: &AutoDirtyTrackingConfig) -> bool {
        if !cfg.enabled {
            return enabled;
        }
        let alpha = 2.0 / (cfg.required_samples as f64 + 1.0);
        self.ema = alpha * changed_ratio + (1.0 - alpha) * self.ema;
        let (on_threshold, off_threshold) = cfg.clamped();

        if enabled {
            if self.ema >= off_threshold {
                self.consecutive += 1;
                if self.consecutive >= cfg.required_samples {
                    self.consecutive = 0;
                    tracing::debug!(ema = self.ema, "auto dirty-tracking: switching off");
                    return false;
                }
            } else {
                self.consecutive = 0;
            }
            enabled
        } else {
            if self.ema <= on_threshold {
                self.consecutive += 1;
                if self.consecutive >= cfg.required_samples {
                    self.consecutive = 0;
                    tracing::debug!(ema = self.ema, "auto dirty-tracking: switching on");
                    return true;
                }
            } else {
                self.consecutive = 0;
            }
            enabled
        }
    }
}

/// The per-room orchestrator. Generic over the keeper it drives;
/// `LandManager` owns one of these per live land.
pub struct TransportAdapter<K: LandKeeper> {
    land_id: LandId,
    keeper: Arc<K>,
    transport: Arc<WebSocketTransport>,
    config: LandRuntimeConfig,
    supports_merged_frame: bool,

    membership: Mutex<MembershipCoordinator>,
    pending: Mutex<PendingEventManager>,
    sync: Mutex<SyncEngine>,
    codec: Arc<Mutex<LandCodec>>,

    /// Serializes the join/disconnect domain into FIFO order:
    /// any equivalent single-slot work-serialization primitive satisfies the
    /// ordering requirement; a plain mutex acquired in arrival order does.
    membership_gate: Mutex<()>,
    /// Guards against two `sync_now` calls overlapping; a stuck sync is
    /// skipped with a debug log rather than queued.
    sync_gate: Mutex<()>,
    dirty_tracking_enabled: AtomicBool,
    dirty_tracking_state: Mutex<DirtyTrackingState>,
}

impl<K: LandKeeper + 'static> TransportAdapter<K> {
    pub fn new(
        land_id: LandId,
        keeper: Arc<K>,
        transport: Arc<WebSocketTransport>,
        config: LandRuntimeConfig,
    ) -> Self {
        let codec_config = CodecConfig::new(
            config.message_encoding,
            crate::codec::StateUpdateCodecConfig {
                encoding: config.state_update_encoding,
                path_hashes: config.path_hashes.as_ref().map(|m| {
                    crate::codec::PathHashRegistry::new(m.clone())
                }),
            },
        );
        let supports_merged_frame = codec_config.supports_merged_frame();
        let dirty_tracking_enabled = config.enable_dirty_tracking;
        Self {
            land_id,
            keeper,
            transport,
            supports_merged_frame,
            membership: Mutex::new(MembershipCoordinator::new()),
            pending: Mutex::new(PendingEventManager::new()),
            sync: Mutex::new(SyncEngine::new()),
            codec: Arc::new(Mutex::new(LandCodec::new(codec_config))),
            membership_gate: Mutex::new(()),
            sync_gate: Mutex::new(()),
            dirty_tracking_enabled: AtomicBool::new(dirty_tracking_enabled),
            dirty_tracking_state: Mutex::new(DirtyTrackingState::new()),
            config,
        }
    }

    pub fn land_id(&self) -> &LandId {
        &self.land_id
    }

    pub async fn player_count(&self) -> usize {
        self.keeper.player_count().await
    }

    // ---- 4.6.1 connection lifecycle -----------------------------------

    /// Registers a freshly accepted connection as connected-not-joined.
    pub async fn on_connect(&self, session: SessionId, client_id: ClientId, auth_info: Option<Value>) {
        let _gate = self.membership_gate.lock().await;
        self.membership.lock().await.register_client(session, client_id, auth_info);
    }

    /// Tears a session down: releases its membership row, unbinds it from
    /// the transport's player map, clears per-player caches if that was the
    /// player's last session, and notifies the keeper.
    pub async fn on_disconnect(&self, session: SessionId, client_id: ClientId) {
        let _gate = self.membership_gate.lock().await;
        let player_id = {
            let mut membership = self.membership.lock().await;
            membership.unregister_session(&session)
        };
        if let Some(player) = player_id {
            self.transport.unbind_player(&player, &session);
            let still_joined = self.membership.lock().await.joined_session_for_player(&player).is_some();
            if !still_joined {
                self.keeper.leave(&player, &client_id).await;
                self.membership.lock().await.release_player_slot(&player);
                self.sync.lock().await.clear_cache_for_disconnected_player(&player);
                let mut codec = self.codec.lock().await;
                codec.state_update.reset_scope(&self.land_id, &UpdateScope::Player(player));
            }
        }
    }

    // ---- 4.6.3 join protocol -------------------------------------------

    /// Runs the full join sequence: validation, duplicate-login kick,
    /// keeper consultation, membership registration, slot allocation,
    /// `joinResponse`, and the first-sync send.
    pub async fn join(
        &self,
        session: SessionId,
        client_id: ClientId,
        request: JoinRequest,
    ) -> Result<(), LandError> {
        let _gate = self.membership_gate.lock().await;

        {
            let membership = self.membership.lock().await;
            if membership.is_joined(&session) {
                return Err(LandError::AlreadyJoined);
            }
            if !membership.is_connected_not_joined(&session) {
                return Err(LandError::SessionNotConnected);
            }
        }

        if let Some(expected) = &self.config.expected_schema_hash {
            let received = request.schema_hash.clone().unwrap_or_default();
            if &received != expected {
                return Err(LandError::SchemaHashMismatch {
                    expected: expected.clone(),
                    received,
                });
            }
        }

        let auth_player_id = request
            .auth_info
            .as_ref()
            .and_then(|v| v.get("playerID"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let guest_player_id = self.config.create_guest_session.then(|| format!("guest-{session}"));
        let resolved_player_id = request
            .requested_player_id
            .clone()
            .or(auth_player_id)
            .or(guest_player_id)
            .unwrap_or_else(|| session.as_str().to_string());
        let player_id = PlayerId::new(resolved_player_id.clone());

        // Duplicate-login kick: at most one joined
        // session per player. The previous session is told it was replaced
        // and its membership row is cleared without releasing the slot.
        if let Some(existing) = self.membership.lock().await.joined_session_for_player(&player_id) {
            if existing != session {
                self.kick_session(&existing, "replaced by a new login for this player").await;
                self.membership.lock().await.remove_joined_player(&existing);
                self.transport.unbind_player(&player_id, &existing);
            }
        }

        let player_session = PlayerSession {
            player_id: player_id.clone(),
            device_id: request.device_id.clone(),
            metadata: request.metadata.clone(),
            auth_info: request.auth_info.clone(),
        };

        let outcome = self.keeper.join(&player_session, &client_id, &session).await;
        let joined_player = match outcome {
            Ok(JoinOutcome::Allow(joined)) => joined,
            Ok(JoinOutcome::Deny) => return Err(LandError::JoinDenied("denied by keeper".to_string())),
            Err(JoinError::RoomIsFull) => return Err(LandError::LandFull),
            Err(JoinError::Denied(reason)) => return Err(LandError::JoinDenied(reason)),
            Err(JoinError::Other(err)) => return Err(LandError::JoinDenied(err.to_string())),
        };

        {
            let mut membership = self.membership.lock().await;
            membership.register_player(session.clone(), joined_player.clone(), request.auth_info.clone());
            if let Err(_full) = membership.allocate_player_slot(&resolved_player_id, &joined_player) {
                membership.remove_joined_player(&session);
                return Err(LandError::LandFull);
            }
        }
        self.transport.bind_player(joined_player.clone(), session.clone());

        let slot = self.membership.lock().await.slot_of(&joined_player);
        self.send_join_response(&session, &request.request_id, slot).await?;
        self.send_first_sync(&session, &joined_player).await?;
        self.flush_pending_for_session(&session, &joined_player).await;

        Ok(())
    }

    async fn kick_session(&self, session: &SessionId, reason: &str) {
        let error = TransportMessage::Error {
            code: serde_json::to_value(ErrorCode::JoinAlreadyJoined)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "JOIN_ALREADY_JOINED".to_string()),
            message: reason.to_string(),
            details: None,
        };
        if let Ok(bytes) = self.codec.lock().await.message.encode(&error) {
            let binary = self.config.message_encoding.uses_messagepack();
            self.transport.send(SendTarget::Session(session.clone()), bytes, binary);
        }
    }

    async fn send_join_response(
        &self,
        session: &SessionId,
        request_id: &str,
        slot: Option<i32>,
    ) -> Result<(), LandError> {
        let response = TransportMessage::JoinResponse {
            request_id: request_id.to_string(),
            success: true,
            land_type: Some(self.land_id.land_type.clone()),
            land_instance_id: Some(self.land_id.instance_id.clone()),
            player_slot: slot,
            encoding: Some(self.config.message_encoding.as_wire_name().to_string()),
            reason: None,
        };
        let bytes = self.codec.lock().await.message.encode(&response)?;
        let binary = self.config.message_encoding.uses_messagepack();
        self.transport.send(SendTarget::Session(session.clone()), bytes, binary);
        Ok(())
    }

    /// Sends one player's very first state view: the full current snapshot
    /// (broadcast fields plus that player's own), diffed from empty, and
    /// seeds both sync caches so the next periodic cycle only sends deltas.
    async fn send_first_sync(&self, session: &SessionId, player: &PlayerId) -> Result<(), LandError> {
        let state = self.keeper.current_state().await;
        let broadcast_part = state.extract_broadcast_snapshot(None);
        let player_part = state.extract_player_snapshot(player, None);
        let merged = merge_objects(broadcast_part.clone(), player_part.clone());

        let mut patches = Vec::new();
        diff(&Value::Object(serde_json::Map::new()), &merged, "", &mut patches);
        let first_sync = StateUpdate::FirstSync(patches);

        {
            let mut sync = self.sync.lock().await;
            sync.seed_broadcast_cache(broadcast_part);
            sync.seed_player_cache(player, player_part);
            sync.mark_first_sync_received(player.clone());
        }

        let bytes = {
            let mut codec = self.codec.lock().await;
            codec.state_update.reset_scope(&self.land_id, &UpdateScope::Player(player.clone()));
            codec
                .state_update
                .encode(&self.land_id, &UpdateScope::Player(player.clone()), &first_sync)?
        };
        let binary = self.config.state_update_encoding.uses_messagepack();
        self.transport.send(SendTarget::Session(session.clone()), bytes, binary);
        Ok(())
    }

    // ---- 4.6.5/4.6.6/4.6.7 periodic sync --------------------------------

    /// Runs one sync cycle: diffs broadcast and per-player views, assembles
    /// and sends `StateUpdate`s, flushes pending events, and adjusts the
    /// adaptive dirty-tracking switch. Overlapping calls are skipped.
    pub async fn sync_now(&self) {
        let Ok(_sync_permit) = self.sync_gate.try_lock() else {
            tracing::debug!(land = %self.land_id, "sync_now already running, skipping tick");
            return;
        };

        let Some(state) = self.keeper.begin_sync().await else {
            tracing::debug!(land = %self.land_id, "keeper sync already in progress, skipping tick");
            return;
        };

        let is_dirty = state.is_dirty();
        let dirty_fields = state.dirty_fields();
        let sync_fields = state.sync_fields();
        let broadcast_fields: BTreeSet<String> = sync_fields
            .iter()
            .filter(|(_, policy)| *policy == FieldPolicy::Broadcast)
            .map(|(name, _)| name.clone())
            .collect();
        let per_player_fields: BTreeSet<String> = sync_fields
            .iter()
            .filter(|(_, policy)| *policy == FieldPolicy::PerPlayer)
            .map(|(name, _)| name.clone())
            .collect();

        let dirty_tracking_active = self.dirty_tracking_enabled.load(Ordering::Relaxed);
        let broadcast_mode = snapshot_mode_for(dirty_tracking_active, is_dirty, &dirty_fields, &broadcast_fields);
        let per_player_mode = snapshot_mode_for(dirty_tracking_active, is_dirty, &dirty_fields, &per_player_fields);

        let broadcast_snapshot = state.extract_broadcast_snapshot(mode_field_filter(&broadcast_mode));
        let broadcast_patches = self.sync.lock().await.compute_broadcast_diff(broadcast_snapshot);

        let joined: Vec<PlayerId> = {
            let sync = self.sync.lock().await;
            self.membership
                .lock()
                .await
                .joined_players()
                .filter(|p| sync.has_first_synced(p))
                .cloned()
                .collect()
        };

        let tracked_fields = (broadcast_fields.len() + per_player_fields.len()).max(1) as f64;
        let changed_ratio = (broadcast_patches.len() as f64 / tracked_fields).min(1.0);
        if self.config.auto_dirty_tracking.enabled {
            let mut tracker = self.dirty_tracking_state.lock().await;
            let new_enabled = tracker.observe(dirty_tracking_active, changed_ratio, &self.config.auto_dirty_tracking);
            self.dirty_tracking_enabled.store(new_enabled, Ordering::Relaxed);
        }

        if self.supports_merged_frame {
            self.sync_branch_merged(&state, broadcast_patches, &per_player_mode, &joined).await;
        } else {
            self.sync_branch_separate(&state, broadcast_patches, &per_player_mode, &joined).await;
        }

        for player in &joined {
            if let Some(session) = self.membership.lock().await.first_session(player) {
                self.flush_pending_for_session(&session, player).await;
            }
        }
        self.pending.lock().await.clear_all();

        self.keeper.end_sync(dirty_tracking_active).await;
    }

    /// Branch A: both codecs are MessagePack, so the shared
    /// broadcast diff and any pending broadcast events are combined into one
    /// opcode-107 frame sent to every already-first-synced player; per-player
    /// diffs still go out individually afterward.
    async fn sync_branch_merged(
        &self,
        state: &K::State,
        broadcast_patches: Vec<crate::codec::StatePatch>,
        per_player_mode: &super::sync_engine::SnapshotMode,
        joined: &[PlayerId],
    ) {
        let pending_broadcast = self.pending.lock().await.pending_broadcast_bodies();
        if !broadcast_patches.is_empty() || !pending_broadcast.is_empty() {
            let broadcast_update = StateUpdate::Diff(broadcast_patches);
            let body = {
                let mut codec = self.codec.lock().await;
                match codec.state_update.encode(&self.land_id, &UpdateScope::Broadcast, &broadcast_update) {
                    Ok(b) => b,
                    Err(err) => {
                        tracing::warn!(land = %self.land_id, %err, "failed to encode broadcast state update");
                        return;
                    }
                }
            };
            match encode_merged_frame(&body, &pending_broadcast) {
                Ok(merged_bytes) => {
                    let sessions = self.joined_sessions(joined).await;
                    let items = sessions
                        .into_iter()
                        .map(|s| (SendTarget::Session(s), merged_bytes.clone(), true))
                        .collect();
                    self.transport.send_batch(items).await;
                }
                Err(err) => tracing::warn!(land = %self.land_id, %err, "failed to encode merged frame"),
            }
        }

        for player in joined {
            let player_part = state.extract_player_snapshot(player, mode_field_filter(per_player_mode));
            let per_patches = self.sync.lock().await.compute_per_player_diff(player, player_part);
            if per_patches.is_empty() {
                continue;
            }
            self.encode_and_send_player_update(player, StateUpdate::Diff(per_patches)).await;
        }
    }

    /// Branch B: encodes one combined `StateUpdate`
    /// per player (broadcast diff concatenated with their own diff),
    /// optionally spread across a bounded worker pool when the configured
    /// codecs are thread-safe.
    async fn sync_branch_separate(
        &self,
        state: &K::State,
        broadcast_patches: Vec<crate::codec::StatePatch>,
        per_player_mode: &super::sync_engine::SnapshotMode,
        joined: &[PlayerId],
    ) {
        let mut updates = Vec::with_capacity(joined.len());
        for player in joined {
            let player_part = state.extract_player_snapshot(player, mode_field_filter(per_player_mode));
            let per_patches = self.sync.lock().await.compute_per_player_diff(player, player_part);
            let update = self.sync.lock().await.assemble_update(player, &broadcast_patches, per_patches);
            updates.push((player.clone(), update));
        }

        let parallel_cfg = &self.config.parallel_encoding;
        let can_parallelize = parallel_cfg.enabled
            && joined.len() >= parallel_cfg.min_players
            && self.codec.lock().await.supports_parallel_encoding();

        if can_parallelize {
            let worker_count = parallel_cfg.worker_count(joined.len());
            let chunk_size = joined.len().div_ceil(worker_count.max(1));
            let mut handles = Vec::new();
            for chunk in updates.chunks(chunk_size.max(1)) {
                let chunk = chunk.to_vec();
                let codec = Arc::clone(&self.codec);
                let land_id = self.land_id.clone();
                let binary = self.config.state_update_encoding.uses_messagepack();
                handles.push(tokio::spawn(async move {
                    let mut out = Vec::with_capacity(chunk.len());
                    for (player, update) in chunk {
                        if update.is_no_change() {
                            continue;
                        }
                        let encoded = {
                            let mut codec = codec.lock().await;
                            codec.state_update.encode(&land_id, &UpdateScope::Player(player.clone()), &update)
                        };
                        if let Ok(bytes) = encoded {
                            out.push((player, bytes, binary));
                        }
                    }
                    out
                }));
            }
            let mut items = Vec::new();
            for handle in handles {
                if let Ok(chunk_results) = handle.await {
                    items.extend(chunk_results);
                }
            }
            self.send_player_updates(items).await;
        } else {
            for (player, update) in updates {
                if update.is_no_change() {
                    continue;
                }
                self.encode_and_send_player_update(&player, update).await;
            }
        }
    }

    async fn send_player_updates(&self, items: Vec<(PlayerId, Vec<u8>, bool)>) {
        for (player, bytes, binary) in items {
            self.transport.send(SendTarget::Player(player), bytes, binary);
        }
    }

    async fn encode_and_send_player_update(&self, player: &PlayerId, update: StateUpdate) {
        let bytes = {
            let mut codec = self.codec.lock().await;
            codec.state_update.encode(&self.land_id, &UpdateScope::Player(player.clone()), &update)
        };
        match bytes {
            Ok(bytes) => {
                let binary = self.config.state_update_encoding.uses_messagepack();
                self.transport.send(SendTarget::Player(player.clone()), bytes, binary);
            }
            Err(err) => tracing::warn!(land = %self.land_id, %player, %err, "failed to encode player state update"),
        }
    }

    async fn joined_sessions(&self, players: &[PlayerId]) -> Vec<SessionId> {
        let membership = self.membership.lock().await;
        players.iter().filter_map(|p| membership.first_session(p)).collect()
    }

    async fn flush_pending_for_session(&self, session: &SessionId, player: &PlayerId) {
        let bodies = {
            let pending = self.pending.lock().await;
            let membership = self.membership.lock().await;
            pending.pending_targeted_bodies(
                session,
                player,
                |s, st| membership.is_session_current(s, st),
                |st| membership.is_player_current(st),
            )
        };
        for body in bodies {
            let binary = self.config.message_encoding.uses_messagepack();
            self.transport.send(SendTarget::Session(session.clone()), body, binary);
        }
    }

    // ---- 4.6.8 inbound message routing ----------------------------------

    /// Decodes and dispatches one inbound frame from an already-joined
    /// session: `action` is answered with `actionResponse`/`error`, `event`
    /// is forwarded to the keeper with no reply.
    pub async fn on_message(&self, session: SessionId, bytes: Vec<u8>) {
        let (player_id, client_id) = {
            let membership = self.membership.lock().await;
            (membership.player_id(&session), membership.client_id(&session))
        };
        let (Some(player_id), Some(client_id)) = (player_id, client_id) else {
            tracing::debug!(%session, "inbound frame for a session with no bound player, dropping");
            return;
        };

        let decoded = self.codec.lock().await.message.decode(&bytes);
        let message = match decoded {
            Ok(m) => m,
            Err(err) => {
                self.send_error(&session, ErrorCode::InvalidMessageFormat, &err.to_string(), None).await;
                return;
            }
        };

        match message {
            TransportMessage::Action {
                request_id,
                type_identifier,
                payload,
            } => {
                self.handle_action(&session, &player_id, &client_id, request_id, type_identifier, payload).await;
            }
            TransportMessage::Event(EventBody::FromClient {
                event_type, payload, ..
            }) => {
                if let Err(err) = self.keeper.handle_event(&event_type, &payload, &player_id, &client_id, &session).await {
                    tracing::warn!(%session, %event_type, %err, "event handler failed");
                }
            }
            other => {
                tracing::debug!(%session, ?other, "ignoring unexpected frame kind from client");
            }
        }
    }

    async fn handle_action(
        &self,
        session: &SessionId,
        player_id: &PlayerId,
        client_id: &ClientId,
        request_id: String,
        type_identifier: String,
        payload: String,
    ) {
        let payload_bytes = match base64::engine::general_purpose::STANDARD.decode(payload.as_bytes()) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.send_error(session, ErrorCode::InvalidMessageFormat, "action payload was not valid base64", None).await;
                return;
            }
        };

        match self.keeper.handle_action(&type_identifier, &payload_bytes, player_id, client_id, session).await {
            Ok(response) => {
                let message = TransportMessage::ActionResponse { request_id, response };
                self.send_to_session(session, &message).await;
            }
            Err(super::keeper::ActionError::NotRegistered(action)) => {
                self.send_error(session, ErrorCode::ActionNotRegistered, &format!("no handler for {action}"), None).await;
            }
            Err(super::keeper::ActionError::Handler(err)) => {
                self.send_error(session, ErrorCode::ActionHandlerError, &err.to_string(), None).await;
            }
        }
    }

    async fn send_to_session(&self, session: &SessionId, message: &TransportMessage) {
        let bytes = self.codec.lock().await.message.encode(message);
        match bytes {
            Ok(bytes) => {
                let binary = self.config.message_encoding.uses_messagepack();
                self.transport.send(SendTarget::Session(session.clone()), bytes, binary);
            }
            Err(err) => tracing::warn!(%session, %err, "failed to encode outbound frame"),
        }
    }

    async fn send_error(&self, session: &SessionId, code: ErrorCode, message: &str, details: Option<Value>) {
        let code_str = serde_json::to_value(code)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let frame = TransportMessage::Error {
            code: code_str,
            message: message.to_string(),
            details,
        };
        self.send_to_session(session, &frame).await;
    }

    // ---- 4.6.9 outbound server events ------------------------------------

    /// Queues a server-originated event for the next sync flush when merged
    /// frames are in play, so it lands in the same cadence as state updates;
    /// otherwise encodes and sends it immediately. `stamp` pins
    /// a targeted event to the membership episode it was created under;
    /// `None` for `Broadcast`. The queued path requires the event body to
    /// encode cleanly as MessagePack so it can be re-unpacked into an opcode
    /// 107 frame; a hybrid config that can't meet that falls back to the
    /// immediate path too.
    pub async fn send_event(&self, target: EventTarget, event_type: String, payload: Value) {
        let message = TransportMessage::Event(EventBody::FromServer { event_type, payload });
        let encoded = self.codec.lock().await.message.encode(&message);
        let Ok(body) = encoded else {
            tracing::warn!(land = %self.land_id, "failed to encode outbound event, dropping");
            return;
        };

        if self.supports_merged_frame {
            if matches!(target, EventTarget::Broadcast) {
                self.pending.lock().await.queue_broadcast(body);
                return;
            }
            let stamp = match &target {
                EventTarget::Player(player) | EventTarget::BroadcastExcept(player) => {
                    let version = self.membership.lock().await.current_player_version(player);
                    Some(MembershipStamp::new(player.clone(), version))
                }
                _ => None,
            };
            self.pending.lock().await.queue_targeted(target, body, stamp);
            return;
        }

        self.send_event_immediately(target, body).await;
    }

    /// Fallback path that encodes a standalone `event` frame and dispatches
    /// it straight to the transport instead of waiting for the next sync
    /// flush.
    async fn send_event_immediately(&self, target: EventTarget, body: Vec<u8>) {
        let binary = self.config.message_encoding.uses_messagepack();
        let send_target = match target {
            EventTarget::Session(session) => SendTarget::Session(session),
            EventTarget::Player(player) => SendTarget::Player(player),
            EventTarget::Broadcast => {
                let sessions = self.joined_sessions(&self.all_joined_players().await).await;
                SendTarget::Sessions(sessions)
            }
            EventTarget::BroadcastExcept(excluded) => {
                let joined = self.all_joined_players().await;
                let remaining: Vec<PlayerId> = joined.into_iter().filter(|p| *p != excluded).collect();
                SendTarget::Sessions(self.joined_sessions(&remaining).await)
            }
            EventTarget::Players(players) => SendTarget::Sessions(self.joined_sessions(&players).await),
        };
        self.transport.send(send_target, body, binary);
    }

    async fn all_joined_players(&self) -> Vec<PlayerId> {
        self.membership.lock().await.joined_players().cloned().collect()
    }
}
