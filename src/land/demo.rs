//! A minimal in-memory `LandKeeper` reference implementation. Not part of
//! the sync fabric -- this exists so the crate's own integration tests and the
//! `main.rs` binary have a concrete type to instantiate the generic
//! `Realm`/`LandManager`/`TransportAdapter` machinery with.
//!
//! Domain: a trivial shared lobby. Every joined player gets a broadcast
//! entry (`players`) visible to everyone, and a per-player `you` field only
//! they receive. The one supported action, `"setPosition"`, updates the
//! caller's broadcast entry.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use super::ids::{ClientId, LandId, PlayerId, SessionId};
use super::keeper::{
    ActionError, FieldPolicy, JoinError, JoinOutcome, LandKeeper, LandState, PlayerSession,
};
use super::manager::LandKeeperFactory;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PlayerEntry {
    x: f64,
    y: f64,
}

/// Snapshot handed to the sync engine once per sync cycle.
#[derive(Debug, Clone)]
pub struct DemoLandState {
    players: HashMap<PlayerId, PlayerEntry>,
    dirty_players: BTreeSet<PlayerId>,
}

impl LandState for DemoLandState {
    fn is_dirty(&self) -> bool {
        !self.dirty_players.is_empty()
    }

    fn dirty_fields(&self) -> BTreeSet<String> {
        if self.dirty_players.is_empty() {
            BTreeSet::new()
        } else {
            BTreeSet::from(["players".to_string()])
        }
    }

    fn sync_fields(&self) -> Vec<(String, FieldPolicy)> {
        vec![
            ("players".to_string(), FieldPolicy::Broadcast),
            ("you".to_string(), FieldPolicy::PerPlayer),
        ]
    }

    fn extract_player_snapshot(&self, player: &PlayerId, fields: Option<&BTreeSet<String>>) -> Value {
        let mut map = serde_json::Map::new();
        let wants = |field: &str| fields.is_none_or(|f| f.contains(field));
        if wants("players") {
            map.insert("players".to_string(), self.players_value());
        }
        if wants("you") {
            let you = self.players.get(player).cloned().unwrap_or_default();
            map.insert("you".to_string(), json!({ "x": you.x, "y": you.y }));
        }
        Value::Object(map)
    }

    fn extract_broadcast_snapshot(&self, fields: Option<&BTreeSet<String>>) -> Value {
        let mut map = serde_json::Map::new();
        if fields.is_none_or(|f| f.contains("players")) {
            map.insert("players".to_string(), self.players_value());
        }
        Value::Object(map)
    }
}

impl DemoLandState {
    fn players_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (player, entry) in &self.players {
            map.insert(player.as_str().to_string(), json!({ "x": entry.x, "y": entry.y }));
        }
        Value::Object(map)
    }
}

struct Inner {
    players: HashMap<PlayerId, PlayerEntry>,
    dirty_players: BTreeSet<PlayerId>,
    syncing: bool,
}

/// The reference keeper for one land instance.
pub struct DemoLandKeeper {
    land_id: LandId,
    inner: RwLock<Inner>,
    sync_gate: Mutex<()>,
}

impl DemoLandKeeper {
    pub fn new(land_id: LandId) -> Self {
        Self {
            land_id,
            inner: RwLock::new(Inner {
                players: HashMap::new(),
                dirty_players: BTreeSet::new(),
                syncing: false,
            }),
            sync_gate: Mutex::new(()),
        }
    }
}

#[async_trait]
impl LandKeeper for DemoLandKeeper {
    type State = DemoLandState;

    async fn join(
        &self,
        session: &PlayerSession,
        _client_id: &ClientId,
        _session_id: &SessionId,
    ) -> Result<JoinOutcome, JoinError> {
        let mut inner = self.inner.write().await;
        inner
            .players
            .entry(session.player_id.clone())
            .or_insert_with(PlayerEntry::default);
        inner.dirty_players.insert(session.player_id.clone());
        tracing::debug!(land_id = %self.land_id, player = %session.player_id, "demo keeper accepted join");
        Ok(JoinOutcome::Allow(session.player_id.clone()))
    }

    async fn leave(&self, player_id: &PlayerId, _client_id: &ClientId) {
        let mut inner = self.inner.write().await;
        inner.players.remove(player_id);
        inner.dirty_players.insert(player_id.clone());
    }

    async fn handle_action(
        &self,
        type_identifier: &str,
        payload: &[u8],
        player_id: &PlayerId,
        _client_id: &ClientId,
        _session_id: &SessionId,
    ) -> Result<Value, ActionError> {
        if type_identifier != "setPosition" {
            return Err(ActionError::NotRegistered(type_identifier.to_string()));
        }
        let requested: PlayerEntry = serde_json::from_slice(payload)
            .map_err(|err| ActionError::Handler(anyhow::anyhow!("invalid setPosition payload: {err}")))?;

        let mut inner = self.inner.write().await;
        inner.players.insert(player_id.clone(), requested.clone());
        inner.dirty_players.insert(player_id.clone());
        Ok(json!({ "x": requested.x, "y": requested.y }))
    }

    async fn handle_event(
        &self,
        _event_type: &str,
        _payload: &Value,
        _player_id: &PlayerId,
        _client_id: &ClientId,
        _session_id: &SessionId,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn current_state(&self) -> Self::State {
        let inner = self.inner.read().await;
        DemoLandState {
            players: inner.players.clone(),
            dirty_players: inner.dirty_players.clone(),
        }
    }

    async fn begin_sync(&self) -> Option<Self::State> {
        let Ok(_permit) = self.sync_gate.try_lock() else {
            return None;
        };
        let mut inner = self.inner.write().await;
        if inner.syncing {
            return None;
        }
        inner.syncing = true;
        Some(DemoLandState {
            players: inner.players.clone(),
            dirty_players: inner.dirty_players.clone(),
        })
    }

    async fn end_sync(&self, clear_dirty_flags: bool) {
        let mut inner = self.inner.write().await;
        inner.syncing = false;
        if clear_dirty_flags {
            inner.dirty_players.clear();
        }
    }

    async fn player_count(&self) -> usize {
        self.inner.read().await.players.len()
    }
}

/// Builds a fresh `DemoLandKeeper` for each new land instance id.
pub struct DemoLandKeeperFactory;

#[async_trait]
impl LandKeeperFactory for DemoLandKeeperFactory {
    type Keeper = DemoLandKeeper;

    async fn create(&self, land_id: &LandId) -> Arc<Self::Keeper> {
        Arc::new(DemoLandKeeper::new(land_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(player: &str) -> PlayerSession {
        PlayerSession {
            player_id: PlayerId::new(player),
            device_id: None,
            metadata: None,
            auth_info: None,
        }
    }

    #[tokio::test]
    async fn join_adds_player_and_marks_dirty() {
        let keeper = DemoLandKeeper::new(LandId::primary("lobby"));
        let outcome = keeper
            .join(&session("alice"), &ClientId::new("c1"), &SessionId::new("s1"))
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::Allow(p) if p.as_str() == "alice"));
        assert_eq!(keeper.player_count().await, 1);

        let state = keeper.current_state().await;
        assert!(state.is_dirty());
    }

    #[tokio::test]
    async fn set_position_updates_broadcast_snapshot() {
        let keeper = DemoLandKeeper::new(LandId::primary("lobby"));
        keeper
            .join(&session("alice"), &ClientId::new("c1"), &SessionId::new("s1"))
            .await
            .unwrap();

        let result = keeper
            .handle_action(
                "setPosition",
                br#"{"x":1.5,"y":2.5}"#,
                &PlayerId::new("alice"),
                &ClientId::new("c1"),
                &SessionId::new("s1"),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({ "x": 1.5, "y": 2.5 }));

        let state = keeper.current_state().await;
        let snapshot = state.extract_broadcast_snapshot(None);
        assert_eq!(snapshot["players"]["alice"], json!({ "x": 1.5, "y": 2.5 }));
    }

    #[tokio::test]
    async fn unregistered_action_is_rejected() {
        let keeper = DemoLandKeeper::new(LandId::primary("lobby"));
        let err = keeper
            .handle_action(
                "doSomethingElse",
                b"{}",
                &PlayerId::new("alice"),
                &ClientId::new("c1"),
                &SessionId::new("s1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NotRegistered(_)));
    }

    #[tokio::test]
    async fn begin_sync_returns_none_while_already_syncing() {
        let keeper = DemoLandKeeper::new(LandId::primary("lobby"));
        let _first = keeper.begin_sync().await.expect("first sync should start");
        assert!(keeper.begin_sync().await.is_none());
        keeper.end_sync(true).await;
        assert!(keeper.begin_sync().await.is_some());
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let keeper = DemoLandKeeper::new(LandId::primary("lobby"));
        keeper
            .join(&session("alice"), &ClientId::new("c1"), &SessionId::new("s1"))
            .await
            .unwrap();
        keeper.leave(&PlayerId::new("alice"), &ClientId::new("c1")).await;
        keeper.leave(&PlayerId::new("alice"), &ClientId::new("c1")).await;
        assert_eq!(keeper.player_count().await, 0);
    }
}
