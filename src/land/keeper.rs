//! `LandKeeper`: the external game-logic engine this core
//! consumes as an opaque capability. Implementing a real keeper is out of
//! scope here -- only the contract is captured, plus a minimal in-memory
//! reference keeper used by this crate's own tests.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;

use super::ids::{ClientId, PlayerId, SessionId};

/// Where a `State`'s top-level field is sent: to everyone, to its owning
/// player only, or never serialized out at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    Broadcast,
    PerPlayer,
    ServerOnly,
}

/// The capability a `LandKeeper`'s domain state must expose to the sync
/// fabric: dirty-field reporting and structural snapshot
/// traversal. `extract` returns the subset of top-level fields that survive
/// `policy_filter` as a snapshot tree.
pub trait LandState: Send + Sync {
    fn is_dirty(&self) -> bool;
    fn dirty_fields(&self) -> BTreeSet<String>;
    fn sync_fields(&self) -> Vec<(String, FieldPolicy)>;

    /// Extracts a snapshot for `player` (broadcast fields plus that
    /// player's per-player fields) restricted to `fields` when `Some`
    /// (dirty-tracking mode), or all non-server-only fields when `None`.
    fn extract_player_snapshot(&self, player: &PlayerId, fields: Option<&BTreeSet<String>>) -> Value;

    /// Extracts the broadcast-only snapshot, restricted the same way.
    fn extract_broadcast_snapshot(&self, fields: Option<&BTreeSet<String>>) -> Value;
}

/// Outcome of `LandKeeper::join`.
pub enum JoinOutcome {
    Allow(PlayerId),
    Deny,
}

/// Business-logic failures a keeper's `join` may raise. Anything else
/// surfaces as `JoinDenied` with the message text.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("room is full")]
    RoomIsFull,
    #[error("join denied: {0}")]
    Denied(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One player's session as presented to the keeper at join time: identity fields resolved by priority (`requestedPlayerID` >
/// `authInfo.playerID` > `guestSession.playerID` > raw session id) before
/// the keeper is consulted.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub player_id: PlayerId,
    pub device_id: Option<String>,
    pub metadata: Option<Value>,
    pub auth_info: Option<Value>,
}

/// The opaque game-logic engine for one land. Implementations
/// own domain state, tick handlers, and action/event resolution; the core
/// only calls these methods across well-defined request boundaries.
#[async_trait]
pub trait LandKeeper: Send + Sync {
    type State: LandState;

    async fn join(
        &self,
        session: &PlayerSession,
        client_id: &ClientId,
        session_id: &SessionId,
    ) -> Result<JoinOutcome, JoinError>;

    /// Idempotent teardown; may be called more than once for the same
    /// player across a disconnect/rejoin race and must tolerate it.
    async fn leave(&self, player_id: &PlayerId, client_id: &ClientId);

    async fn handle_action(
        &self,
        type_identifier: &str,
        payload: &[u8],
        player_id: &PlayerId,
        client_id: &ClientId,
        session_id: &SessionId,
    ) -> Result<Value, ActionError>;

    async fn handle_event(
        &self,
        event_type: &str,
        payload: &Value,
        player_id: &PlayerId,
        client_id: &ClientId,
        session_id: &SessionId,
    ) -> Result<(), anyhow::Error>;

    /// A read-only snapshot of current state, used for the first-sync
    /// sequence and not guarded by `begin_sync`/`end_sync`.
    async fn current_state(&self) -> Self::State;

    /// Returns `None` if another sync is already running for this land.
    async fn begin_sync(&self) -> Option<Self::State>;
    async fn end_sync(&self, clear_dirty_flags: bool);

    async fn player_count(&self) -> usize;
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("action not registered: {0}")]
    NotRegistered(String),
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}
