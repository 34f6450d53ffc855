//! `StateUpdate` frames: `noChange | firstSync(patches) | diff(patches)`, and
//! the four wire shapes a state-update encoder can produce.

use crate::land::ids::{LandId, PlayerId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::pathhash::{parse_path, DictionaryScope, DictionaryTable, PathHashRegistry};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid messagepack encode: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
    #[error("invalid messagepack decode: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("merged 107 frame requires MessagePack on both message and state-update codecs")]
    MergedFrameRequiresMessagePack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    Set,
    Remove,
    Add,
}

impl PatchOp {
    fn opcode(self) -> u8 {
        match self {
            Self::Set => 1,
            Self::Remove => 2,
            Self::Add => 3,
        }
    }

    fn from_opcode(code: u8) -> Result<Self, CodecError> {
        match code {
            1 => Ok(Self::Set),
            2 => Ok(Self::Remove),
            3 => Ok(Self::Add),
            other => Err(CodecError::MalformedFrame(format!(
                "unknown patch opcode {other}"
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Remove => "remove",
            Self::Add => "add",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatePatch {
    pub path: String,
    pub op: PatchOp,
    pub value: Option<Value>,
}

impl StatePatch {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            op: PatchOp::Set,
            value: Some(value),
        }
    }

    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            op: PatchOp::Add,
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: PatchOp::Remove,
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    NoChange,
    FirstSync(Vec<StatePatch>),
    Diff(Vec<StatePatch>),
}

impl StateUpdate {
    fn opcode(&self) -> u8 {
        match self {
            Self::NoChange => 0,
            Self::FirstSync(_) => 1,
            Self::Diff(_) => 2,
        }
    }

    pub fn patches(&self) -> &[StatePatch] {
        match self {
            Self::NoChange => &[],
            Self::FirstSync(p) | Self::Diff(p) => p,
        }
    }

    pub fn is_no_change(&self) -> bool {
        matches!(self, Self::NoChange)
    }
}

/// Which wire shape a `StateUpdateCodec` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateUpdateEncoding {
    JsonObject,
    OpcodeJsonArray,
    OpcodeJsonArrayLegacy,
    OpcodeMessagePack,
}

impl StateUpdateEncoding {
    /// Encoders that never mutate shared state across calls (other than the
    /// dictionary, which is internally synchronized) may run on a worker
    /// pool during parallel encoding. Both JSON shapes qualify; MessagePack state updates are kept
    /// serial because they're only used together with the merged-event path
    /// which already runs per-player in sequence.
    pub fn is_thread_safe(self) -> bool {
        matches!(self, Self::JsonObject | Self::OpcodeJsonArray)
    }

    pub fn uses_messagepack(self) -> bool {
        matches!(self, Self::OpcodeMessagePack)
    }

    pub fn uses_path_hash(self) -> bool {
        matches!(self, Self::OpcodeJsonArray | Self::OpcodeMessagePack)
    }
}

#[derive(Debug, Clone)]
pub struct StateUpdateCodecConfig {
    pub encoding: StateUpdateEncoding,
    pub path_hashes: Option<PathHashRegistry>,
}

/// Encodes/decodes `StateUpdate`s for one land, carrying the path-hash
/// registry and the per-scope dynamic-key dictionaries.
#[derive(Debug, Clone)]
pub struct StateUpdateCodec {
    config: StateUpdateCodecConfig,
    dictionaries: DictionaryTable,
}

impl StateUpdateCodec {
    pub fn new(config: StateUpdateCodecConfig) -> Self {
        Self {
            config,
            dictionaries: DictionaryTable::default(),
        }
    }

    pub fn encoding(&self) -> StateUpdateEncoding {
        self.config.encoding
    }

    /// Resets the dynamic-key dictionary for `scope` — called whenever a
    /// `firstSync` is about to be encoded so the recipient is taught every
    /// slot from scratch.
    pub fn reset_scope(&mut self, land: &LandId, scope: &UpdateScope) {
        self.dictionaries.reset_scope(&dictionary_scope(land, scope));
    }

    pub fn drop_land(&mut self, land: &LandId) {
        self.dictionaries.drop_land(land);
    }

    /// Encodes one `StateUpdate` into its wire bytes, as an array body ready
    /// either to stand alone or to be embedded in a merged 107 frame.
    pub fn encode(
        &mut self,
        land: &LandId,
        scope: &UpdateScope,
        update: &StateUpdate,
    ) -> Result<Vec<u8>, CodecError> {
        let body = self.encode_body(land, scope, update)?;
        match self.config.encoding {
            StateUpdateEncoding::JsonObject => Ok(serde_json::to_vec(&body)?),
            StateUpdateEncoding::OpcodeJsonArray | StateUpdateEncoding::OpcodeJsonArrayLegacy => {
                Ok(serde_json::to_vec(&body)?)
            }
            StateUpdateEncoding::OpcodeMessagePack => Ok(rmp_serde::to_vec(&body)?),
        }
    }

    /// Builds the `Value` body shared by every encoding before the final
    /// JSON-vs-MessagePack serialization step.
    fn encode_body(
        &mut self,
        land: &LandId,
        scope: &UpdateScope,
        update: &StateUpdate,
    ) -> Result<Value, CodecError> {
        match self.config.encoding {
            StateUpdateEncoding::JsonObject => Ok(self.encode_object(update)),
            StateUpdateEncoding::OpcodeJsonArrayLegacy => Ok(self.encode_legacy_array(update)),
            StateUpdateEncoding::OpcodeJsonArray | StateUpdateEncoding::OpcodeMessagePack => {
                Ok(self.encode_pathhash_array(land, scope, update))
            }
        }
    }

    fn encode_object(&self, update: &StateUpdate) -> Value {
        let patches: Vec<Value> = update
            .patches()
            .iter()
            .map(|p| {
                json!({
                    "path": p.path,
                    "op": p.op.as_str(),
                    "value": p.value,
                })
            })
            .collect();
        json!({ "kind": kind_name(update), "patches": patches })
    }

    fn encode_legacy_array(&self, update: &StateUpdate) -> Value {
        let patch_array: Vec<Value> = update
            .patches()
            .iter()
            .map(|p| match &p.value {
                Some(v) => json!([p.path, p.op.opcode(), v]),
                None => json!([p.path, p.op.opcode()]),
            })
            .collect();
        json!([update.opcode(), { "patches": patch_array }])
    }

    fn encode_pathhash_array(&mut self, land: &LandId, scope: &UpdateScope, update: &StateUpdate) -> Value {
        let registry = self.config.path_hashes.clone().unwrap_or_default();
        let dict = self.dictionaries.scope_mut(dictionary_scope(land, scope));
        let patch_array: Vec<Value> = update
            .patches()
            .iter()
            .map(|p| {
                let parsed = parse_path(&p.path, &registry);
                let path_token: Value = match registry.hash_for(&parsed.pattern) {
                    Some(hash) => hash.into(),
                    None => parsed.pattern.clone().into(),
                };
                let key_token = dict.encode_keys(&parsed.dynamic_keys);
                match &p.value {
                    Some(v) => json!([path_token, key_token, p.op.opcode(), v]),
                    None => json!([path_token, key_token, p.op.opcode()]),
                }
            })
            .collect();
        json!([update.opcode(), { "patches": patch_array }])
    }

    /// Decodes a previously-encoded body back into a `StateUpdate` (used by
    /// tests and by clients written against this same codec). Only the
    /// `JsonObject` and legacy array shapes round-trip to string paths
    /// without an inverse path-hash table; callers holding a hash→pattern
    /// inverse map can still decode the pathhash variants by pre-resolving
    /// `path_token` themselves.
    pub fn decode_object(bytes: &[u8]) -> Result<StateUpdate, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::MalformedFrame("missing kind".into()))?;
        let patches = value
            .get("patches")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::MalformedFrame("missing patches".into()))?
            .iter()
            .map(|p| {
                let path = p
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let op = match p.get("op").and_then(Value::as_str) {
                    Some("set") => PatchOp::Set,
                    Some("remove") => PatchOp::Remove,
                    Some("add") => PatchOp::Add,
                    _ => PatchOp::Set,
                };
                StatePatch {
                    path,
                    op,
                    value: p.get("value").cloned(),
                }
            })
            .collect();
        match kind {
            "noChange" => Ok(StateUpdate::NoChange),
            "firstSync" => Ok(StateUpdate::FirstSync(patches)),
            "diff" => Ok(StateUpdate::Diff(patches)),
            other => Err(CodecError::MalformedFrame(format!("unknown kind {other}"))),
        }
    }
}

fn kind_name(update: &StateUpdate) -> &'static str {
    match update {
        StateUpdate::NoChange => "noChange",
        StateUpdate::FirstSync(_) => "firstSync",
        StateUpdate::Diff(_) => "diff",
    }
}

fn dictionary_scope(land: &LandId, scope: &UpdateScope) -> DictionaryScope {
    match scope {
        UpdateScope::Broadcast => DictionaryScope::Broadcast(land.clone()),
        UpdateScope::Player(player) => DictionaryScope::Player(land.clone(), player.clone()),
    }
}

/// Which dictionary / view a `StateUpdate` is being encoded for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateScope {
    Broadcast,
    Player(PlayerId),
}

/// Builds the merged opcode-107 frame: `[107, stateUpdateBody, eventsArray]`.
/// Only valid when both the state-update and message codecs are
/// MessagePack.
pub fn encode_merged_frame(
    state_update_body: &[u8],
    event_bodies: &[Vec<u8>],
) -> Result<Vec<u8>, CodecError> {
    let state_value: Value = rmp_serde::from_slice(state_update_body)?;
    let events: Result<Vec<Value>, CodecError> = event_bodies
        .iter()
        .map(|b| rmp_serde::from_slice(b).map_err(CodecError::from))
        .collect();
    let frame = json!([107, state_value, events?]);
    Ok(rmp_serde::to_vec(&frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_round_trips_diff() {
        let mut codec = StateUpdateCodec::new(StateUpdateCodecConfig {
            encoding: StateUpdateEncoding::JsonObject,
            path_hashes: None,
        });
        let update = StateUpdate::Diff(vec![StatePatch::set("/score", json!(11))]);
        let land = LandId::primary("arena");
        let bytes = codec.encode(&land, &UpdateScope::Broadcast, &update).unwrap();
        let decoded = StateUpdateCodec::decode_object(&bytes).unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn pathhash_defines_then_references_dynamic_key() {
        let mut hashes = std::collections::HashMap::new();
        hashes.insert("players.*.x".to_string(), 7u32);
        let mut codec = StateUpdateCodec::new(StateUpdateCodecConfig {
            encoding: StateUpdateEncoding::OpcodeJsonArray,
            path_hashes: Some(PathHashRegistry::new(hashes)),
        });
        let land = LandId::primary("arena");
        let update = StateUpdate::Diff(vec![StatePatch::set("/players/abc/x", json!(1))]);

        let first = codec.encode_body(&land, &UpdateScope::Broadcast, &update).unwrap();
        let second = codec.encode_body(&land, &UpdateScope::Broadcast, &update).unwrap();

        let first_patch = &first[1]["patches"][0];
        let second_patch = &second[1]["patches"][0];
        assert_eq!(first_patch[0], json!(7));
        assert_eq!(first_patch[1], json!([0, "abc"]));
        assert_eq!(second_patch[1], json!(0));
    }

    #[test]
    fn reset_scope_forces_redefinition() {
        let mut hashes = std::collections::HashMap::new();
        hashes.insert("players.*.x".to_string(), 7u32);
        let mut codec = StateUpdateCodec::new(StateUpdateCodecConfig {
            encoding: StateUpdateEncoding::OpcodeJsonArray,
            path_hashes: Some(PathHashRegistry::new(hashes)),
        });
        let land = LandId::primary("arena");
        let scope = UpdateScope::Player(PlayerId::new("p1"));
        let update = StateUpdate::FirstSync(vec![StatePatch::set("/players/abc/x", json!(1))]);

        codec.encode_body(&land, &scope, &update).unwrap();
        codec.reset_scope(&land, &scope);
        let after_reset = codec.encode_body(&land, &scope, &update).unwrap();
        assert_eq!(after_reset[1]["patches"][0][1], json!([0, "abc"]));
    }

    #[test]
    fn merged_frame_wraps_state_and_events() {
        let mut codec = StateUpdateCodec::new(StateUpdateCodecConfig {
            encoding: StateUpdateEncoding::OpcodeMessagePack,
            path_hashes: None,
        });
        let land = LandId::primary("arena");
        let update = StateUpdate::Diff(vec![StatePatch::set("/t", json!(1))]);
        let state_bytes = codec.encode(&land, &UpdateScope::Broadcast, &update).unwrap();
        let event_body = rmp_serde::to_vec(&json!({"type": "ping"})).unwrap();
        let merged = encode_merged_frame(&state_bytes, &[event_body]).unwrap();
        let decoded: Value = rmp_serde::from_slice(&merged).unwrap();
        assert_eq!(decoded[0], json!(107));
        assert_eq!(decoded[1][0], json!(2));
    }
}
