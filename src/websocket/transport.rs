//! `WebSocketTransport`: owns the set of live connections
//! and fans frames out via a per-session drain worker plus a process-wide
//! batch-drain worker.
//!
//! This is deliberately room-agnostic -- it knows sessions, client ids, and
//! player-to-session fan-out, but nothing about lands. `LandRouter` is
//! its delegate and is the only thing that understands rooms.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};

use crate::land::ids::{ClientId, PlayerId, SessionId};

/// Up to this many items are popped from the batch buffer per drain tick.
const DRAIN_BATCH_SIZE: usize = 64;
/// Batch-drain worker sleep when its pop returns empty.
const BATCH_IDLE_SLEEP: Duration = Duration::from_millis(1);
/// Minimum time between repeated "unknown session/player" warnings for the
/// same id.
const WARN_REPEAT_INTERVAL: Duration = Duration::from_secs(2);
/// Soft cap on distinct ids tracked by the warning rate limiter.
const WARN_TRACKED_ID_CAP: usize = 5000;

/// Callbacks the transport invokes on connection lifecycle and inbound
/// frames; `LandRouter` is the concrete implementation.
#[async_trait]
pub trait TransportDelegate: Send + Sync {
    async fn on_connect(&self, session: SessionId, client_id: ClientId);
    async fn on_message(&self, session: SessionId, frame: Vec<u8>);
    async fn on_disconnect(&self, session: SessionId, client_id: ClientId);
}

/// Who a low-level send is addressed to. Room-scoped targeting
/// (broadcast/broadcastExcept/players[]) is resolved by the caller
/// (`TransportAdapter`) into an explicit session list before reaching this
/// layer, since the transport has no notion of "room".
#[derive(Debug, Clone)]
pub enum SendTarget {
    Session(SessionId),
    Player(PlayerId),
    Sessions(Vec<SessionId>),
}

#[derive(Clone)]
struct Frame {
    bytes: Vec<u8>,
    binary: bool,
}

struct BatchItem {
    target: SendTarget,
    frame: Frame,
}

struct SessionHandle {
    client_id: ClientId,
    queue: mpsc::UnboundedSender<Frame>,
}

/// Rate-limits repeated "unknown id" warnings: at most one warning every 2s
/// per id, with a soft cap on how many distinct ids are tracked (past the
/// cap, warnings are no longer rate-limited individually to bound memory --
/// they simply always fire).
#[derive(Default)]
struct WarnLimiter {
    last_warned: DashMap<String, Instant>,
}

impl WarnLimiter {
    fn should_warn(&self, id: &str) -> bool {
        if let Some(last) = self.last_warned.get(id) {
            if last.elapsed() < WARN_REPEAT_INTERVAL {
                return false;
            }
        }
        if self.last_warned.len() < WARN_TRACKED_ID_CAP || self.last_warned.contains_key(id) {
            self.last_warned.insert(id.to_string(), Instant::now());
        }
        true
    }
}

/// The live-connection registry and fan-out engine.
pub struct WebSocketTransport {
    sessions: DashMap<SessionId, SessionHandle>,
    player_sessions: DashMap<PlayerId, HashSet<SessionId>>,
    batch_buffer: Arc<Mutex<VecDeque<BatchItem>>>,
    warn_limiter: WarnLimiter,
    delegate: Mutex<Option<Arc<dyn TransportDelegate>>>,
}

impl WebSocketTransport {
    pub fn new() -> Arc<Self> {
        let transport = Arc::new(Self {
            sessions: DashMap::new(),
            player_sessions: DashMap::new(),
            batch_buffer: Arc::new(Mutex::new(VecDeque::new())),
            warn_limiter: WarnLimiter::default(),
            delegate: Mutex::new(None),
        });
        transport.clone().spawn_batch_drain_worker();
        transport
    }

    pub async fn set_delegate(&self, delegate: Arc<dyn TransportDelegate>) {
        *self.delegate.lock().await = Some(delegate);
    }

    async fn delegate(&self) -> Option<Arc<dyn TransportDelegate>> {
        self.delegate.lock().await.clone()
    }

    /// Accepts a connection: splits the socket, spawns its dedicated drain
    /// worker, and registers the session. Runs until the client disconnects
    /// or a send fails; the caller should `tokio::spawn` this.
    pub async fn serve_connection(
        self: &Arc<Self>,
        socket: WebSocket,
        session: SessionId,
        client_id: ClientId,
    ) {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

        self.sessions.insert(
            session.clone(),
            SessionHandle {
                client_id: client_id.clone(),
                queue: tx,
            },
        );

        if let Some(delegate) = self.delegate().await {
            delegate.on_connect(session.clone(), client_id.clone()).await;
        }

        // Per-session drain worker: single consumer of this session's
        // queue, awaiting the connection's send primitive.
        let drain_session = session.clone();
        let drain_task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let message = if frame.binary {
                    Message::Binary(frame.bytes.into())
                } else {
                    Message::Text(String::from_utf8_lossy(&frame.bytes).into_owned().into())
                };
                if sink.send(message).await.is_err() {
                    tracing::debug!(%drain_session, "send failed, connection considered lost");
                    break;
                }
            }
        });

        // Inbound loop: forward every binary/text frame to the delegate.
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => {
                    if let Some(delegate) = self.delegate().await {
                        delegate.on_message(session.clone(), text.into_bytes()).await;
                    }
                }
                Message::Binary(bytes) => {
                    if let Some(delegate) = self.delegate().await {
                        delegate.on_message(session.clone(), bytes.into()).await;
                    }
                }
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }

        drain_task.abort();
        self.finish_session(&session, &client_id).await;
    }

    async fn finish_session(&self, session: &SessionId, client_id: &ClientId) {
        self.sessions.remove(session);
        self.player_sessions.retain(|_, sessions| {
            sessions.remove(session);
            !sessions.is_empty()
        });
        if let Some(delegate) = self.delegate().await {
            delegate.on_disconnect(session.clone(), client_id.clone()).await;
        }
    }

    pub fn bind_player(&self, player: PlayerId, session: SessionId) {
        self.player_sessions.entry(player).or_default().insert(session);
    }

    pub fn unbind_player(&self, player: &PlayerId, session: &SessionId) {
        if let Some(mut sessions) = self.player_sessions.get_mut(player) {
            sessions.remove(session);
        }
    }

    /// Non-blocking enqueue onto one session's queue.
    fn enqueue_session(&self, session: &SessionId, frame: Frame) {
        match self.sessions.get(session) {
            Some(handle) => {
                if handle.queue.send(frame).is_err() {
                    tracing::debug!(%session, "session queue closed, dropping frame");
                }
            }
            None => {
                if self.warn_limiter.should_warn(session.as_str()) {
                    tracing::warn!(%session, "send targeted unknown session, dropping");
                }
            }
        }
    }

    fn resolve_sessions(&self, target: &SendTarget) -> Vec<SessionId> {
        match target {
            SendTarget::Session(session) => vec![session.clone()],
            SendTarget::Sessions(sessions) => sessions.clone(),
            SendTarget::Player(player) => match self.player_sessions.get(player) {
                Some(sessions) => sessions.iter().cloned().collect(),
                None => {
                    if self.warn_limiter.should_warn(player.as_str()) {
                        tracing::warn!(%player, "send targeted unknown player, dropping");
                    }
                    Vec::new()
                }
            },
        }
    }

    /// Sends one frame to `target` immediately (no batch-buffer hop).
    pub fn send(&self, target: SendTarget, bytes: Vec<u8>, binary: bool) {
        for session in self.resolve_sessions(&target) {
            self.enqueue_session(&session, Frame { bytes: bytes.clone(), binary });
        }
    }

    /// Deposits items into the shared batch buffer for the global drain
    /// worker to redispatch: lets a room's sync
    /// cycle enqueue many sends in one hop without awaiting each.
    pub async fn send_batch(&self, items: Vec<(SendTarget, Vec<u8>, bool)>) {
        let mut buffer = self.batch_buffer.lock().await;
        for (target, bytes, binary) in items {
            buffer.push_back(BatchItem {
                target,
                frame: Frame { bytes, binary },
            });
        }
    }

    fn spawn_batch_drain_worker(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let popped: Vec<BatchItem> = {
                    let mut buffer = self.batch_buffer.lock().await;
                    let n = DRAIN_BATCH_SIZE.min(buffer.len());
                    buffer.drain(..n).collect()
                };
                if popped.is_empty() {
                    tokio::time::sleep(BATCH_IDLE_SLEEP).await;
                    continue;
                }
                for item in popped {
                    for session in self.resolve_sessions(&item.target) {
                        self.enqueue_session(&session, item.frame.clone());
                    }
                }
            }
        });
    }

    pub fn is_connected(&self, session: &SessionId) -> bool {
        self.sessions.contains_key(session)
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_limiter_blocks_repeats_within_window() {
        let limiter = WarnLimiter::default();
        assert!(limiter.should_warn("s1"));
        assert!(!limiter.should_warn("s1"));
    }

    #[tokio::test]
    async fn sending_to_unknown_session_does_not_panic() {
        let transport = WebSocketTransport::new();
        transport.send(SendTarget::Session(SessionId::new("ghost")), b"hi".to_vec(), false);
    }

    #[tokio::test]
    async fn bind_and_resolve_player_sessions() {
        let transport = WebSocketTransport::new();
        let player = PlayerId::new("alice");
        transport.bind_player(player.clone(), SessionId::new("s1"));
        transport.bind_player(player.clone(), SessionId::new("s2"));
        let resolved = transport.resolve_sessions(&SendTarget::Player(player));
        assert_eq!(resolved.len(), 2);
    }

    #[tokio::test]
    async fn unbind_player_removes_single_session() {
        let transport = WebSocketTransport::new();
        let player = PlayerId::new("alice");
        transport.bind_player(player.clone(), SessionId::new("s1"));
        transport.unbind_player(&player, &SessionId::new("s1"));
        let resolved = transport.resolve_sessions(&SendTarget::Player(player));
        assert!(resolved.is_empty());
    }
}
