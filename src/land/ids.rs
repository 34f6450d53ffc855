//! Opaque identifiers shared across the land runtime.
//!
//! All of these are plain byte strings on the wire; the newtypes exist so the
//! compiler stops us from handing a `ClientId` where a `PlayerId` belongs.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(SessionId, "One WebSocket connection, unique for its lifetime.");
opaque_id!(
    ClientId,
    "Short opaque tag assigned on accept; used only for display/routing symmetry."
);

/// Length of a freshly minted `ClientId`.
const CLIENT_ID_LEN: usize = 6;
const CLIENT_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

impl ClientId {
    /// Mints a fresh display-only client tag"). Collisions are harmless -- the id is
    /// never used as a lookup key on its own, only alongside a `SessionId`.
    pub fn generate() -> Self {
        use rand::RngExt;
        let mut rng = rand::rng();
        let tag: String = (0..CLIENT_ID_LEN)
            .map(|_| {
                let idx = rng.random_range(0..CLIENT_ID_CHARS.len());
                #[allow(clippy::indexing_slicing)]
                let ch = CLIENT_ID_CHARS[idx] as char;
                ch
            })
            .collect();
        Self(tag)
    }
}
opaque_id!(
    PlayerId,
    "Application-meaningful player identity; may outlive any one session."
);

/// `(landType, instanceId)`. Serializes as `"landType"` when the instance id
/// is empty, else `"landType:instanceId"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LandId {
    pub land_type: String,
    pub instance_id: String,
}

impl LandId {
    pub fn new(land_type: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            land_type: land_type.into(),
            instance_id: instance_id.into(),
        }
    }

    /// A land with no instance id — the legacy single-room-per-type shape.
    pub fn primary(land_type: impl Into<String>) -> Self {
        Self::new(land_type, String::new())
    }

    /// The `"{landType}-replay"` convention used for re-evaluation lands.
    pub fn replay_land_type(&self) -> String {
        format!("{}-replay", self.land_type)
    }

    pub fn as_wire(&self) -> String {
        if self.instance_id.is_empty() {
            self.land_type.clone()
        } else {
            format!("{}:{}", self.land_type, self.instance_id)
        }
    }

    pub fn parse(wire: &str) -> Self {
        match wire.split_once(':') {
            Some((land_type, instance_id)) => Self::new(land_type, instance_id),
            None => Self::primary(wire),
        }
    }
}

impl fmt::Display for LandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// Deterministic `int32 ∈ [0, 1000)` assigned from a fixed-size table keyed
/// by account key via a stable hash plus linear probing.
pub type PlayerSlot = i32;

pub const PLAYER_SLOT_TABLE_SIZE: i32 = 1000;

/// `(PlayerID, version)` witnessing the membership episode under which a
/// server-side operation (typically a pending event) was created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MembershipStamp {
    pub player: PlayerId,
    pub version: u64,
}

impl MembershipStamp {
    pub fn new(player: PlayerId, version: u64) -> Self {
        Self { player, version }
    }
}

/// Stable 32-bit hash used to seed linear probing of the player-slot table.
/// Any deterministic hash satisfies the contract; this one is FNV-1a.
pub fn stable_hash(key: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
