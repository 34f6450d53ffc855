//! Per-room construction surface: the configuration a
//! `TransportAdapter` is built with. `crate::config::land` is the
//! file/env-backed loader that produces one of these per land type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::{MessageEncoding, StateUpdateEncoding};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelEncodingConfig {
    pub enabled: bool,
    pub min_players: usize,
    pub batch_size: usize,
    /// Worker cap used when the room has fewer than 30 players.
    pub small_room_cap: usize,
    /// Worker cap used at or above 30 players.
    pub large_room_cap: usize,
}

impl Default for ParallelEncodingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_players: 8,
            batch_size: 16,
            small_room_cap: 2,
            large_room_cap: 4,
        }
    }
}

impl ParallelEncodingConfig {
    /// `perRoomCap`: 2 for <30 players, else 4.
    pub fn per_room_cap(&self, player_count: usize) -> usize {
        if player_count < 30 {
            self.small_room_cap
        } else {
            self.large_room_cap
        }
    }

    /// `min(perRoomCap, ceil(n / batchSize), n)`.
    pub fn worker_count(&self, player_count: usize) -> usize {
        if player_count == 0 {
            return 0;
        }
        let by_batch = player_count.div_ceil(self.batch_size.max(1));
        self.per_room_cap(player_count).min(by_batch).min(player_count).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoDirtyTrackingConfig {
    pub enabled: bool,
    /// EMA changed-object-ratio threshold above which dirty tracking turns
    /// OFF.
    pub off_threshold: f64,
    /// EMA threshold below which dirty tracking turns back ON.
    pub on_threshold: f64,
    /// Consecutive samples required before flipping.
    pub required_samples: u32,
}

impl Default for AutoDirtyTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            off_threshold: 0.55,
            on_threshold: 0.30,
            required_samples: 30,
        }
    }
}

impl AutoDirtyTrackingConfig {
    /// Thresholds are clamped to maintain >= 0.01 separation.
    pub fn clamped(&self) -> (f64, f64) {
        let on = self.on_threshold.clamp(0.0, 1.0);
        let off = self.off_threshold.clamp(0.0, 1.0);
        if off - on < 0.01 {
            (on, (on + 0.01).min(1.0))
        } else {
            (on, off)
        }
    }
}

/// The per-room construction surface a `TransportAdapter` reads at
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandRuntimeConfig {
    pub message_encoding: MessageEncoding,
    pub state_update_encoding: StateUpdateEncoding,
    #[serde(default)]
    pub path_hashes: Option<HashMap<String, u32>>,
    #[serde(default)]
    pub enable_legacy_join: bool,
    #[serde(default)]
    pub enable_dirty_tracking: bool,
    #[serde(default)]
    pub expected_schema_hash: Option<String>,
    #[serde(default)]
    pub create_guest_session: bool,
    #[serde(default)]
    pub parallel_encoding: ParallelEncodingConfig,
    #[serde(default)]
    pub auto_dirty_tracking: AutoDirtyTrackingConfig,
    #[serde(default)]
    pub use_snapshot_for_sync: bool,
}

impl Default for LandRuntimeConfig {
    fn default() -> Self {
        Self {
            message_encoding: MessageEncoding::JsonObject,
            state_update_encoding: StateUpdateEncoding::JsonObject,
            path_hashes: None,
            enable_legacy_join: false,
            enable_dirty_tracking: false,
            expected_schema_hash: None,
            create_guest_session: false,
            parallel_encoding: ParallelEncodingConfig::default(),
            auto_dirty_tracking: AutoDirtyTrackingConfig::default(),
            use_snapshot_for_sync: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_respects_small_room_cap() {
        let cfg = ParallelEncodingConfig::default();
        // 5 players, batch_size 16 => ceil(5/16)=1, capped to 1 regardless of room cap.
        assert_eq!(cfg.worker_count(5), 1);
        // 40 players, batch_size 16 => ceil(40/16)=3, large_room_cap=4, so 3 wins.
        assert_eq!(cfg.worker_count(40), 3);
    }

    #[test]
    fn large_room_uses_larger_cap() {
        let cfg = ParallelEncodingConfig {
            batch_size: 4,
            ..Default::default()
        };
        // 40 players, batch_size 4 => ceil(40/4)=10, cap for >=30 players is 4
        assert_eq!(cfg.worker_count(40), 4);
    }

    #[test]
    fn threshold_clamp_maintains_minimum_separation() {
        let cfg = AutoDirtyTrackingConfig {
            on_threshold: 0.5,
            off_threshold: 0.505,
            ..Default::default()
        };
        let (on, off) = cfg.clamped();
        assert!(off - on >= 0.01 - f64::EPSILON);
    }
}
