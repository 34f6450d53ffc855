//! `MembershipCoordinator`: per-room session <-> client <->
//! player mapping, membership versioning, and player-slot allocation.
//!
//! Every method here is synchronous and assumes it runs inside the room's
//! own serialized domain -- no internal locking.

use std::collections::HashMap;

use serde_json::Value;

use super::ids::{ClientId, MembershipStamp, PlayerId, PlayerSlot, SessionId};
use super::slots::{PlayerSlotTable, SlotTableFull};

/// One session's view inside a room: disjoint states.
#[derive(Debug, Clone)]
struct SessionRecord {
    client_id: ClientId,
    auth_info: Option<Value>,
    player_id: Option<PlayerId>,
    /// The player's `version` at the moment this session last bound to a
    /// player.
    session_version: u64,
}

#[derive(Debug, Default)]
pub struct MembershipCoordinator {
    sessions: HashMap<SessionId, SessionRecord>,
    /// Current membership version per player; bumped on every join.
    player_versions: HashMap<PlayerId, u64>,
    /// Which session currently holds the *joined* state for a player, if
    /// any.
    joined_session_for_player: HashMap<PlayerId, SessionId>,
    slots: PlayerSlotTable,
}

impl MembershipCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `connected-not-joined`: records a freshly accepted connection.
    pub fn register_client(
        &mut self,
        session: SessionId,
        client_id: ClientId,
        auth_info: Option<Value>,
    ) {
        self.sessions.insert(
            session,
            SessionRecord {
                client_id,
                auth_info,
                player_id: None,
                session_version: 0,
            },
        );
    }

    pub fn is_connected_not_joined(&self, session: &SessionId) -> bool {
        matches!(self.sessions.get(session), Some(r) if r.player_id.is_none())
    }

    pub fn is_joined(&self, session: &SessionId) -> bool {
        matches!(self.sessions.get(session), Some(r) if r.player_id.is_some())
    }

    /// Advances `version[player]` by one and binds `session` to that new
    /// version. Returns the freshly minted stamp.
    pub fn register_player(
        &mut self,
        session: SessionId,
        player: PlayerId,
        auth_info: Option<Value>,
    ) -> MembershipStamp {
        let version = self.player_versions.entry(player.clone()).or_insert(0);
        *version += 1;
        let stamp = MembershipStamp::new(player.clone(), *version);

        let record = self.sessions.entry(session.clone()).or_insert(SessionRecord {
            client_id: ClientId::new(session.as_str().to_string()),
            auth_info: None,
            player_id: None,
            session_version: 0,
        });
        record.player_id = Some(player.clone());
        record.session_version = stamp.version;
        if let Some(auth_info) = auth_info {
            record.auth_info = Some(auth_info);
        }
        self.joined_session_for_player.insert(player, session);
        stamp
    }

    /// Clears all three maps for `session` but does NOT release the player
    /// slot -- the slot is only released on a *permanent* leave
    /// via `release_player_slot`.
    pub fn unregister_session(&mut self, session: &SessionId) -> Option<PlayerId> {
        let record = self.sessions.remove(session)?;
        if let Some(player) = &record.player_id {
            if self.joined_session_for_player.get(player) == Some(session) {
                self.joined_session_for_player.remove(player);
            }
        }
        record.player_id
    }

    /// Rolls back a partially-installed join: removes the player binding
    /// from the session without advancing the version further.
    pub fn remove_joined_player(&mut self, session: &SessionId) {
        if let Some(record) = self.sessions.get_mut(session) {
            if let Some(player) = record.player_id.take() {
                if self.joined_session_for_player.get(&player) == Some(session) {
                    self.joined_session_for_player.remove(&player);
                }
            }
        }
    }

    pub fn release_player_slot(&mut self, player: &PlayerId) {
        self.slots.release(player);
    }

    pub fn allocate_player_slot(
        &mut self,
        account_key: &str,
        player: &PlayerId,
    ) -> Result<PlayerSlot, SlotTableFull> {
        self.slots.allocate(account_key, player)
    }

    pub fn slot_of(&self, player: &PlayerId) -> Option<PlayerSlot> {
        self.slots.slot_of(player)
    }

    pub fn player_id(&self, session: &SessionId) -> Option<PlayerId> {
        self.sessions.get(session).and_then(|r| r.player_id.clone())
    }

    pub fn client_id(&self, session: &SessionId) -> Option<ClientId> {
        self.sessions.get(session).map(|r| r.client_id.clone())
    }

    pub fn auth_info(&self, session: &SessionId) -> Option<Value> {
        self.sessions.get(session).and_then(|r| r.auth_info.clone())
    }

    /// The session currently *joined* as `player`, if any. Used to find the
    /// session to evict on a duplicate login.
    pub fn joined_session_for_player(&self, player: &PlayerId) -> Option<SessionId> {
        self.joined_session_for_player.get(player).cloned()
    }

    /// First joined session for `player` -- identical to
    /// `joined_session_for_player` since at most one session can be joined
    /// per player at a time; named separately to mirror the query surface's
    /// `firstSession(for:)`.
    pub fn first_session(&self, player: &PlayerId) -> Option<SessionId> {
        self.joined_session_for_player(player)
    }

    pub fn session_ids_for_player(&self, player: &PlayerId) -> Vec<SessionId> {
        self.joined_session_for_player(player).into_iter().collect()
    }

    pub fn current_player_version(&self, player: &PlayerId) -> u64 {
        self.player_versions.get(player).copied().unwrap_or(0)
    }

    /// True iff `session`'s stamped version still matches the player's
    /// current version -- used to drop stale targeted deliveries.
    pub fn is_session_current(&self, session: &SessionId, expected: &MembershipStamp) -> bool {
        matches!(self.sessions.get(session), Some(r) if r.session_version == expected.version)
    }

    pub fn is_player_current(&self, expected: &MembershipStamp) -> bool {
        self.current_player_version(&expected.player) == expected.version
    }

    pub fn joined_players(&self) -> impl Iterator<Item = &PlayerId> {
        self.joined_session_for_player.keys()
    }

    pub fn joined_sessions(&self) -> impl Iterator<Item = &SessionId> {
        self.joined_session_for_player.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::new(s)
    }

    #[test]
    fn register_player_bumps_version_each_episode() {
        let mut membership = MembershipCoordinator::new();
        membership.register_client(sid("s1"), ClientId::new("c1"), None);
        let alice = PlayerId::new("alice");
        let first = membership.register_player(sid("s1"), alice.clone(), None);
        assert_eq!(first.version, 1);

        membership.unregister_session(&sid("s1"));
        membership.register_client(sid("s2"), ClientId::new("c2"), None);
        let second = membership.register_player(sid("s2"), alice.clone(), None);
        assert_eq!(second.version, 2);

        assert!(!membership.is_player_current(&first));
        assert!(membership.is_player_current(&second));
    }

    #[test]
    fn stamp_checked_against_both_player_and_session_version() {
        let mut membership = MembershipCoordinator::new();
        membership.register_client(sid("s1"), ClientId::new("c1"), None);
        let bob = PlayerId::new("bob");
        let stamp = membership.register_player(sid("s1"), bob.clone(), None);
        assert!(membership.is_session_current(&sid("s1"), &stamp));

        // Rejoin under a new session bumps both player version and
        // session binding; the old stamp must be rejected on both counts.
        membership.unregister_session(&sid("s1"));
        membership.register_client(sid("s2"), ClientId::new("c2"), None);
        let new_stamp = membership.register_player(sid("s2"), bob, None);
        assert!(!membership.is_session_current(&sid("s1"), &stamp));
        assert!(!membership.is_player_current(&stamp));
        assert!(membership.is_session_current(&sid("s2"), &new_stamp));
    }

    #[test]
    fn unregister_session_does_not_release_slot() {
        let mut membership = MembershipCoordinator::new();
        membership.register_client(sid("s1"), ClientId::new("c1"), None);
        let alice = PlayerId::new("alice");
        membership.register_player(sid("s1"), alice.clone(), None);
        let slot = membership.allocate_player_slot("alice", &alice).unwrap();
        membership.unregister_session(&sid("s1"));
        assert_eq!(membership.slot_of(&alice), Some(slot));
    }

    #[test]
    fn joined_session_for_player_tracks_single_active_session() {
        let mut membership = MembershipCoordinator::new();
        membership.register_client(sid("s1"), ClientId::new("c1"), None);
        let alice = PlayerId::new("alice");
        membership.register_player(sid("s1"), alice.clone(), None);
        assert_eq!(membership.joined_session_for_player(&alice), Some(sid("s1")));

        membership.register_client(sid("s2"), ClientId::new("c2"), None);
        membership.register_player(sid("s2"), alice.clone(), None);
        assert_eq!(membership.joined_session_for_player(&alice), Some(sid("s2")));
    }
}
