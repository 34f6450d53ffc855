//! Path pattern hashing and the per-scope dynamic-key dictionary.

use crate::land::ids::{LandId, PlayerId};
use serde_json::Value;
use std::collections::HashMap;

/// A JSON-pointer path split into its static pattern (`players.*.position.x`)
/// and the ordered dynamic key components the `*`s stand for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub pattern: String,
    pub dynamic_keys: Vec<String>,
}

/// Splits a JSON pointer such as `/players/abc123/position/x` into the
/// pattern `players.*.position.x` plus `["abc123"]`. Array indices (all
/// digits) and known static field names stay literal; every other path
/// component is treated as a dynamic key (the common case is a player id or
/// other per-entity map key). Purely numeric components stay literal because
/// most array indices are not "dynamic" in the dictionary sense — only the
/// *registered* patterns matter, so whether a component is treated as
/// literal or as `*` is driven by whether substituting `*` for it yields a
/// pattern present in the caller's `PathHashRegistry`.
pub fn parse_path(path: &str, registry: &PathHashRegistry) -> ParsedPath {
    let components: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if components == [""] {
        return ParsedPath {
            pattern: String::new(),
            dynamic_keys: Vec::new(),
        };
    }

    // Try the most specific pattern first: no component wildcarded, then one,
    // two, ... Registries are small (tens of entries) so this brute-force
    // search is cheap and avoids guessing which positions are "keys" ahead
    // of time.
    let n = components.len();
    for mask in 0u32..(1u32 << n) {
        let mut pattern_parts = Vec::with_capacity(n);
        let mut dynamic_keys = Vec::new();
        for (i, component) in components.iter().enumerate() {
            if mask & (1 << i) != 0 {
                pattern_parts.push("*");
                dynamic_keys.push((*component).to_string());
            } else {
                pattern_parts.push(component);
            }
        }
        let pattern = pattern_parts.join(".");
        if registry.contains(&pattern) {
            return ParsedPath {
                pattern,
                dynamic_keys,
            };
        }
    }

    ParsedPath {
        pattern: components.join("."),
        dynamic_keys: Vec::new(),
    }
}

/// Caller-supplied map of static path pattern to stable `u32` id.
#[derive(Debug, Clone, Default)]
pub struct PathHashRegistry {
    hashes: HashMap<String, u32>,
}

impl PathHashRegistry {
    pub fn new(hashes: HashMap<String, u32>) -> Self {
        Self { hashes }
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.hashes.contains_key(pattern)
    }

    pub fn hash_for(&self, pattern: &str) -> Option<u32> {
        self.hashes.get(pattern).copied()
    }
}

/// Scope a dynamic-key dictionary is keyed on: one land's broadcast stream,
/// or one land's per-player stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictionaryScope {
    Broadcast(LandId),
    Player(LandId, PlayerId),
}

/// Per-scope dictionary: first use of a string key emits `[slot, key]` and
/// remembers it; subsequent uses emit `slot` only. `reset` is called at the
/// start of every `firstSync` so a late joiner is always taught every slot it
/// will see.
#[derive(Debug, Clone, Default)]
pub struct DynamicKeyDictionary {
    slots: HashMap<String, i64>,
    next_slot: i64,
}

/// Either a freshly-defined `[slot, key]` pair or a bare previously-defined
/// `slot`.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyToken {
    Define(i64, String),
    Reference(i64),
}

impl KeyToken {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Define(slot, key) => Value::Array(vec![(*slot).into(), key.clone().into()]),
            Self::Reference(slot) => Value::from(*slot),
        }
    }
}

impl DynamicKeyDictionary {
    pub fn reset(&mut self) {
        self.slots.clear();
        self.next_slot = 0;
    }

    /// Encodes one dynamic key, defining it on first use.
    pub fn encode_key(&mut self, key: &str) -> KeyToken {
        if let Some(slot) = self.slots.get(key) {
            return KeyToken::Reference(*slot);
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(key.to_string(), slot);
        KeyToken::Define(slot, key.to_string())
    }

    /// Encodes an ordered list of dynamic keys for one path, `null` if there
    /// are none, a single token if there is one, an array of tokens
    /// otherwise.
    pub fn encode_keys(&mut self, keys: &[String]) -> Value {
        match keys.len() {
            0 => Value::Null,
            1 => self.encode_key(&keys[0]).to_json(),
            _ => Value::Array(keys.iter().map(|k| self.encode_key(k).to_json()).collect()),
        }
    }
}

/// Owns one `DynamicKeyDictionary` per scope seen so far.
#[derive(Debug, Clone, Default)]
pub struct DictionaryTable {
    dictionaries: HashMap<DictionaryScope, DynamicKeyDictionary>,
}

impl DictionaryTable {
    pub fn scope_mut(&mut self, scope: DictionaryScope) -> &mut DynamicKeyDictionary {
        self.dictionaries.entry(scope).or_default()
    }

    pub fn reset_scope(&mut self, scope: &DictionaryScope) {
        if let Some(dict) = self.dictionaries.get_mut(scope) {
            dict.reset();
        }
    }

    pub fn drop_land(&mut self, land: &LandId) {
        self.dictionaries
            .retain(|scope, _| !matches!(scope, DictionaryScope::Broadcast(l) | DictionaryScope::Player(l, _) if l == land));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PathHashRegistry {
        let mut hashes = HashMap::new();
        hashes.insert("players.*.position.x".to_string(), 1);
        hashes.insert("score".to_string(), 2);
        PathHashRegistry::new(hashes)
    }

    #[test]
    fn parses_dynamic_component() {
        let parsed = parse_path("/players/abc123/position/x", &registry());
        assert_eq!(parsed.pattern, "players.*.position.x");
        assert_eq!(parsed.dynamic_keys, vec!["abc123".to_string()]);
    }

    #[test]
    fn parses_static_path() {
        let parsed = parse_path("/score", &registry());
        assert_eq!(parsed.pattern, "score");
        assert!(parsed.dynamic_keys.is_empty());
    }

    #[test]
    fn falls_back_to_literal_pattern_when_unregistered() {
        let parsed = parse_path("/unregistered/path", &registry());
        assert_eq!(parsed.pattern, "unregistered.path");
        assert!(parsed.dynamic_keys.is_empty());
    }

    #[test]
    fn first_use_defines_second_use_references() {
        let mut dict = DynamicKeyDictionary::default();
        let first = dict.encode_key("abc123");
        let second = dict.encode_key("abc123");
        assert!(matches!(first, KeyToken::Define(0, ref k) if k == "abc123"));
        assert_eq!(second, KeyToken::Reference(0));
    }

    #[test]
    fn reset_forgets_previously_defined_slots() {
        let mut dict = DynamicKeyDictionary::default();
        dict.encode_key("abc123");
        dict.reset();
        let after_reset = dict.encode_key("abc123");
        assert!(matches!(after_reset, KeyToken::Define(0, _)));
    }
}
