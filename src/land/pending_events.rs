//! `PendingEventManager`: buffers targeted and broadcast
//! server events between sync flushes.

use super::ids::{ClientId, MembershipStamp, PlayerId, SessionId};

/// Who a server-originated event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    Session(SessionId),
    Player(PlayerId),
    Broadcast,
    BroadcastExcept(PlayerId),
    Players(Vec<PlayerId>),
}

impl EventTarget {
    fn matches(&self, session: &SessionId, player: &PlayerId) -> bool {
        match self {
            Self::Session(target) => target == session,
            Self::Player(target) => target == player,
            Self::Broadcast => true,
            Self::BroadcastExcept(excluded) => excluded != player,
            Self::Players(targets) => targets.contains(player),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTargetedEvent {
    target: EventTarget,
    body: Vec<u8>,
    stamp: Option<MembershipStamp>,
}

#[derive(Debug, Clone)]
struct PendingBroadcastEvent {
    body: Vec<u8>,
}

/// A simple two-list buffer of events queued for the next sync flush. Lives
/// per-room, mutated only inside the room's serialized domain.
#[derive(Debug, Default)]
pub struct PendingEventManager {
    targeted: Vec<PendingTargetedEvent>,
    broadcast: Vec<PendingBroadcastEvent>,
}

impl PendingEventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_targeted(&mut self, target: EventTarget, body: Vec<u8>, stamp: Option<MembershipStamp>) {
        self.targeted.push(PendingTargetedEvent { target, body, stamp });
    }

    pub fn queue_broadcast(&mut self, body: Vec<u8>) {
        self.broadcast.push(PendingBroadcastEvent { body });
    }

    /// Targeted event bodies addressed to `session`/`player`, filtered by
    /// target match *and* stamp currency: a stamped event
    /// is dropped at flush time unless both the session's and the player's
    /// current versions still match the stamp recorded at queue time.
    pub fn pending_targeted_bodies(
        &self,
        session: &SessionId,
        player: &PlayerId,
        is_session_current: impl Fn(&SessionId, &MembershipStamp) -> bool,
        is_player_current: impl Fn(&MembershipStamp) -> bool,
    ) -> Vec<Vec<u8>> {
        self.targeted
            .iter()
            .filter(|event| event.target.matches(session, player))
            .filter(|event| match &event.stamp {
                None => true,
                Some(stamp) => is_session_current(session, stamp) && is_player_current(stamp),
            })
            .map(|event| event.body.clone())
            .collect()
    }

    pub fn pending_broadcast_bodies(&self) -> Vec<Vec<u8>> {
        self.broadcast.iter().map(|e| e.body.clone()).collect()
    }

    pub fn has_broadcast(&self) -> bool {
        !self.broadcast.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.targeted.clear();
        self.broadcast.clear();
    }

    /// Convenience used by `TransportAdapter::send_event` to
    /// know whether anything is pending for a given client, for logging.
    #[cfg(test)]
    pub fn targeted_len(&self) -> usize {
        self.targeted.len()
    }
}
