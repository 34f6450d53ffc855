//! `SyncEngine`: per-player and broadcast snapshot caches,
//! the diff algorithm, and `StateUpdate` assembly.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::Value;

use super::ids::PlayerId;
use crate::codec::{PatchOp, StatePatch, StateUpdate};

/// Which fields a diff/extraction pass is restricted to.
#[derive(Debug, Clone)]
pub enum SnapshotMode {
    All,
    DirtyTracking(BTreeSet<String>),
}

impl SnapshotMode {
    fn as_field_filter(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::All => None,
            Self::DirtyTracking(fields) => Some(fields),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Computes the patch list turning `old` into `new`, restricted to a JSON
/// pointer prefix, by walking both trees key-by-key.
pub fn diff(old: &Value, new: &Value, prefix: &str, out: &mut Vec<StatePatch>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = format!("{prefix}/{key}");
                match (old_map.get(key), new_map.get(key)) {
                    (None, Some(new_value)) => out.push(StatePatch::add(path, new_value.clone())),
                    (Some(_), None) => out.push(StatePatch::remove(path)),
                    (Some(old_value), Some(new_value)) => {
                        diff_values(old_value, new_value, &path, out);
                    }
                    (None, None) => unreachable!("key came from one of the two maps"),
                }
            }
        }
        _ => diff_values(old, new, prefix, out),
    }
}

fn diff_values(old: &Value, new: &Value, path: &str, out: &mut Vec<StatePatch>) {
    if values_equal(old, new) {
        return;
    }
    match (old, new) {
        (Value::Object(_), Value::Object(_)) => diff(old, new, path, out),
        (Value::Array(old_arr), Value::Array(new_arr)) => {
            if old_arr.len() == new_arr.len() {
                for (i, (o, n)) in old_arr.iter().zip(new_arr.iter()).enumerate() {
                    diff_values(o, n, &format!("{path}/{i}"), out);
                }
            } else {
                out.push(StatePatch::set(path, new.clone()));
            }
        }
        _ => out.push(StatePatch::set(path, new.clone())),
    }
}

/// Numeric `int`/`double` with the same numeric value compare equal
/// regardless of JSON number subtype.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                a == b
            } else {
                a == b
            }
        }
        _ => a == b,
    }
}

/// Applies `patches` to `base`, used by tests to verify `Diff(a,b)` applied
/// to `a` yields `b`.
pub fn apply_patches(base: &Value, patches: &[StatePatch]) -> Value {
    let mut result = base.clone();
    for patch in patches {
        apply_patch(&mut result, patch);
    }
    result
}

fn apply_patch(root: &mut Value, patch: &StatePatch) {
    let pointer_parts: Vec<&str> = patch.path.trim_start_matches('/').split('/').collect();
    let Some((last, parents)) = pointer_parts.split_last() else {
        return;
    };
    let mut cursor = root;
    for part in parents {
        cursor = cursor
            .as_object_mut()
            .map(|m| m.entry((*part).to_string()).or_insert_with(empty_object))
            .expect("intermediate path component must be an object");
    }
    let Some(obj) = cursor.as_object_mut() else {
        return;
    };
    match patch.op {
        PatchOp::Remove => {
            obj.remove(*last);
        }
        PatchOp::Set | PatchOp::Add => {
            if let Some(value) = &patch.value {
                obj.insert((*last).to_string(), value.clone());
            }
        }
    }
}

/// Per-room cache state and diff orchestration.
#[derive(Default)]
pub struct SyncEngine {
    broadcast_cache: Value,
    per_player_cache: HashMap<PlayerId, Value>,
    first_sync_done: HashSet<PlayerId>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            broadcast_cache: empty_object(),
            per_player_cache: HashMap::new(),
            first_sync_done: HashSet::new(),
        }
    }

    pub fn has_first_synced(&self, player: &PlayerId) -> bool {
        self.first_sync_done.contains(player)
    }

    /// Computes the broadcast diff against the cache and updates the cache
    /// to `current` regardless of whether anyone is connected.
    pub fn compute_broadcast_diff(&mut self, current: Value) -> Vec<StatePatch> {
        let mut patches = Vec::new();
        diff(&self.broadcast_cache, &current, "", &mut patches);
        self.broadcast_cache = current;
        patches
    }

    /// Computes a player's per-player-only diff against their cache and
    /// updates the cache. Callers seed the cache first via
    /// `late_join_snapshot` for a fresh joiner.
    pub fn compute_per_player_diff(&mut self, player: &PlayerId, current: Value) -> Vec<StatePatch> {
        let previous = self
            .per_player_cache
            .get(player)
            .cloned()
            .unwrap_or_else(empty_object);
        let mut patches = Vec::new();
        diff(&previous, &current, "", &mut patches);
        self.per_player_cache.insert(player.clone(), current);
        patches
    }

    /// Seeds the per-player cache for a fresh joiner and returns the
    /// `firstSync` patch list (a diff from empty).
    pub fn late_join_snapshot(&mut self, player: &PlayerId, snapshot: Value) -> Vec<StatePatch> {
        let mut patches = Vec::new();
        diff(&empty_object(), &snapshot, "", &mut patches);
        self.per_player_cache.insert(player.clone(), snapshot);
        patches
    }

    pub fn mark_first_sync_received(&mut self, player: PlayerId) {
        self.first_sync_done.insert(player);
    }

    /// Concatenates the shared broadcast diff with a player's own diff into
    /// one `StateUpdate`.
    /// Returns `NoChange` when both are empty and firstSync already
    /// happened for this player.
    pub fn assemble_update(
        &self,
        player: &PlayerId,
        broadcast_patches: &[StatePatch],
        per_player_patches: Vec<StatePatch>,
    ) -> StateUpdate {
        let mut combined = broadcast_patches.to_vec();
        combined.extend(per_player_patches);
        if combined.is_empty() && self.has_first_synced(player) {
            StateUpdate::NoChange
        } else if !self.has_first_synced(player) {
            StateUpdate::FirstSync(combined)
        } else {
            StateUpdate::Diff(combined)
        }
    }

    /// Clears a disconnected player's cache and firstSync flag so a
    /// subsequent join behaves as fresh.
    pub fn clear_cache_for_disconnected_player(&mut self, player: &PlayerId) {
        self.per_player_cache.remove(player);
        self.first_sync_done.remove(player);
    }

    pub fn broadcast_cache(&self) -> &Value {
        &self.broadcast_cache
    }

    /// Overwrites the broadcast cache without computing a diff -- used when
    /// a fresh joiner's `firstSync` already carries the full broadcast view
    /// on the wire and the cache just needs to catch up.
    pub fn seed_broadcast_cache(&mut self, value: Value) {
        self.broadcast_cache = value;
    }

    /// Overwrites a player's per-player cache without computing a diff,
    /// counterpart to `seed_broadcast_cache` for the per-player-only view.
    pub fn seed_player_cache(&mut self, player: &PlayerId, value: Value) {
        self.per_player_cache.insert(player.clone(), value);
    }
}

/// Unions two disjoint-keyed snapshot objects (broadcast-tagged fields plus
/// per-player-tagged fields) into the combined view a `firstSync` sends.
pub fn merge_objects(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a), Value::Object(b)) => {
            a.extend(b);
            Value::Object(a)
        }
        (Value::Object(a), _) => Value::Object(a),
        (_, Value::Object(b)) => Value::Object(b),
        (a, _) => a,
    }
}

/// Intersects a state's dirty fields with the fields a given view (broadcast
/// or per-player) is allowed to see, producing the `SnapshotMode` for that
/// view this tick.
pub fn snapshot_mode_for(
    dirty_tracking_enabled: bool,
    is_dirty: bool,
    dirty_fields: &BTreeSet<String>,
    view_fields: &BTreeSet<String>,
) -> SnapshotMode {
    if dirty_tracking_enabled && is_dirty {
        let intersected: BTreeSet<String> = dirty_fields.intersection(view_fields).cloned().collect();
        SnapshotMode::DirtyTracking(intersected)
    } else {
        SnapshotMode::All
    }
}

pub fn mode_field_filter(mode: &SnapshotMode) -> Option<&BTreeSet<String>> {
    mode.as_field_filter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_then_apply_round_trips() {
        let a = json!({"score": 10, "name": "alice"});
        let b = json!({"score": 11, "name": "alice", "level": 2});
        let mut patches = Vec::new();
        diff(&a, &b, "", &mut patches);
        let applied = apply_patches(&a, &patches);
        assert_eq!(applied, b);
    }

    #[test]
    fn removed_key_emits_remove_patch() {
        let a = json!({"score": 10, "temp": true});
        let b = json!({"score": 10});
        let mut patches = Vec::new();
        diff(&a, &b, "", &mut patches);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].op, PatchOp::Remove);
        assert_eq!(patches[0].path, "/temp");
    }

    #[test]
    fn numeric_equality_ignores_int_vs_double() {
        let a = json!({"x": 5});
        let b = json!({"x": 5.0});
        let mut patches = Vec::new();
        diff(&a, &b, "", &mut patches);
        assert!(patches.is_empty());
    }

    #[test]
    fn nested_object_change_recurses_to_child_path() {
        let a = json!({"players": {"abc": {"x": 1, "y": 2}}});
        let b = json!({"players": {"abc": {"x": 1, "y": 3}}});
        let mut patches = Vec::new();
        diff(&a, &b, "", &mut patches);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].path, "/players/abc/y");
    }

    #[test]
    fn first_sync_happens_once_then_diffs() {
        let mut engine = SyncEngine::new();
        let alice = PlayerId::new("alice");
        let snapshot = json!({"score": 0});
        let first = engine.late_join_snapshot(&alice, snapshot.clone());
        let update = engine.assemble_update(&alice, &[], first);
        assert!(matches!(update, StateUpdate::FirstSync(_)));
        engine.mark_first_sync_received(alice.clone());

        let next = engine.compute_per_player_diff(&alice, json!({"score": 1}));
        let update2 = engine.assemble_update(&alice, &[], next);
        assert!(matches!(update2, StateUpdate::Diff(_)));
    }

    #[test]
    fn no_change_after_first_sync_when_nothing_moved() {
        let mut engine = SyncEngine::new();
        let alice = PlayerId::new("alice");
        engine.late_join_snapshot(&alice, json!({"score": 0}));
        engine.mark_first_sync_received(alice.clone());
        let patches = engine.compute_per_player_diff(&alice, json!({"score": 0}));
        let update = engine.assemble_update(&alice, &[], patches);
        assert!(matches!(update, StateUpdate::NoChange));
    }

    #[test]
    fn broadcast_cache_updates_even_with_no_players() {
        let mut engine = SyncEngine::new();
        let patches = engine.compute_broadcast_diff(json!({"tick": 1}));
        assert_eq!(patches.len(), 1);
        assert_eq!(engine.broadcast_cache(), &json!({"tick": 1}));
    }

    #[test]
    fn clear_cache_resets_first_sync_for_rejoin() {
        let mut engine = SyncEngine::new();
        let alice = PlayerId::new("alice");
        engine.late_join_snapshot(&alice, json!({"score": 0}));
        engine.mark_first_sync_received(alice.clone());
        engine.clear_cache_for_disconnected_player(&alice);
        assert!(!engine.has_first_synced(&alice));
    }
}
