//! Wire codec registry: the message codec and the
//! state-update codec, plus the combined configuration a land is
//! constructed with.

pub mod message;
pub mod pathhash;
pub mod state_update;

pub use message::{EventBody, MessageCodec, MessageEncoding, TransportMessage};
pub use pathhash::{DictionaryScope, DictionaryTable, PathHashRegistry};
pub use state_update::{
    encode_merged_frame, CodecError, PatchOp, StatePatch, StateUpdate, StateUpdateCodec,
    StateUpdateCodecConfig, StateUpdateEncoding, UpdateScope,
};

/// The encoding pair a land is configured with.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub message_encoding: MessageEncoding,
    pub state_update: StateUpdateCodecConfig,
}

impl CodecConfig {
    pub fn new(message_encoding: MessageEncoding, state_update: StateUpdateCodecConfig) -> Self {
        Self {
            message_encoding,
            state_update,
        }
    }

    /// Merged opcode-107 framing requires both codecs to be MessagePack.
    pub fn supports_merged_frame(&self) -> bool {
        self.message_encoding.uses_messagepack() && self.state_update.encoding.uses_messagepack()
    }
}

/// A land's codec pair, owned per-room so the state-update codec's dynamic
/// key dictionaries stay scoped to that land.
pub struct LandCodec {
    pub message: MessageCodec,
    pub state_update: StateUpdateCodec,
}

impl LandCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            message: MessageCodec::new(config.message_encoding),
            state_update: StateUpdateCodec::new(config.state_update),
        }
    }

    /// Whether this land's configuration can run parallel per-player
    /// encoding: both the message codec and the
    /// state-update codec must declare thread-safety.
    pub fn supports_parallel_encoding(&self) -> bool {
        self.message.encoding.is_thread_safe() && self.state_update.encoding().is_thread_safe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn merged_frame_requires_both_messagepack() {
        let hybrid = CodecConfig::new(
            MessageEncoding::JsonObject,
            StateUpdateCodecConfig {
                encoding: StateUpdateEncoding::OpcodeMessagePack,
                path_hashes: None,
            },
        );
        assert!(!hybrid.supports_merged_frame());

        let pure = CodecConfig::new(
            MessageEncoding::MessagePackOpcodeArray,
            StateUpdateCodecConfig {
                encoding: StateUpdateEncoding::OpcodeMessagePack,
                path_hashes: None,
            },
        );
        assert!(pure.supports_merged_frame());
    }

    #[test]
    fn parallel_encoding_needs_both_thread_safe() {
        let codec = LandCodec::new(CodecConfig::new(
            MessageEncoding::JsonObject,
            StateUpdateCodecConfig {
                encoding: StateUpdateEncoding::OpcodeJsonArray,
                path_hashes: Some(PathHashRegistry::new(HashMap::new())),
            },
        ));
        assert!(codec.supports_parallel_encoding());

        let msgpack_state = LandCodec::new(CodecConfig::new(
            MessageEncoding::MessagePackOpcodeArray,
            StateUpdateCodecConfig {
                encoding: StateUpdateEncoding::OpcodeMessagePack,
                path_hashes: None,
            },
        ));
        assert!(!msgpack_state.supports_parallel_encoding());
    }
}
