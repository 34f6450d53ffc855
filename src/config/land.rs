//! Per-land-type runtime configuration, file/env loaded the same
//! way the rest of `config::` is. Generalizes the existing single-room
//! `ServerConfig` shape to "one `LandRuntimeConfig` per registered land
//! type, plus a default for types that don't override anything".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::land::LandRuntimeConfig;

/// The land-type -> runtime-config table a `Realm` is constructed from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LandConfigSet {
    /// Applied to any land type with no entry in `overrides`.
    #[serde(default)]
    pub default: LandRuntimeConfig,
    /// Per-land-type overrides, keyed by `landType`.
    #[serde(default)]
    pub overrides: HashMap<String, LandRuntimeConfig>,
}

impl LandConfigSet {
    #[must_use]
    pub fn for_land_type(&self, land_type: &str) -> LandRuntimeConfig {
        self.overrides
            .get(land_type)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MessageEncoding, StateUpdateEncoding};

    #[test]
    fn falls_back_to_default_for_unregistered_type() {
        let set = LandConfigSet::default();
        let cfg = set.for_land_type("arena");
        assert_eq!(cfg.message_encoding, MessageEncoding::JsonObject);
    }

    #[test]
    fn override_wins_for_its_land_type() {
        let mut set = LandConfigSet::default();
        set.overrides.insert(
            "arena".to_string(),
            LandRuntimeConfig {
                state_update_encoding: StateUpdateEncoding::OpcodeMessagePack,
                ..Default::default()
            },
        );
        assert_eq!(
            set.for_land_type("arena").state_update_encoding,
            StateUpdateEncoding::OpcodeMessagePack
        );
        assert_eq!(
            set.for_land_type("lobby").state_update_encoding,
            StateUpdateEncoding::JsonObject
        );
    }
}
