//! Error codes and the frame they're carried in.
//!
//! Grounded on `protocol::error_codes::ErrorCode` (teacher's SCREAMING_SNAKE_CASE,
//! `description()`-bearing enum) and `protocol::messages::ServerMessage::Error`,
//! narrowed to the join/action/event/codec families this runtime actually raises.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    JoinSessionNotConnected,
    JoinAlreadyJoined,
    JoinLandIdMismatch,
    JoinRoomNotFound,
    JoinRoomFull,
    JoinDenied,
    JoinSchemaHashMismatch,
    ActionNotRegistered,
    ActionHandlerError,
    EventHandlerError,
    InvalidJson,
    InvalidMessageFormat,
}

impl ErrorCode {
    pub fn description(&self) -> &'static str {
        match self {
            Self::JoinSessionNotConnected => {
                "This session is not in a state that can join a land (already bound or disconnected)."
            }
            Self::JoinAlreadyJoined => "This session has already joined a land.",
            Self::JoinLandIdMismatch => {
                "The requested land id does not match this connection's legacy-bound land."
            }
            Self::JoinRoomNotFound => "No land exists with the requested instance id.",
            Self::JoinRoomFull => "The land has reached its player capacity.",
            Self::JoinDenied => "The land keeper declined this join.",
            Self::JoinSchemaHashMismatch => "The client's schema hash does not match the server's.",
            Self::ActionNotRegistered => "No handler is registered for this action type.",
            Self::ActionHandlerError => "The action handler returned an error.",
            Self::EventHandlerError => "The event handler returned an error.",
            Self::InvalidJson => "The frame was not valid JSON.",
            Self::InvalidMessageFormat => "The frame did not match any known message shape.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Internal errors raised while operating on a land; callers map these to a
/// wire `ErrorCode` rather than leaking them directly.
#[derive(Debug, Error)]
pub enum LandError {
    #[error("session not connected")]
    SessionNotConnected,
    #[error("session already joined")]
    AlreadyJoined,
    #[error("land id mismatch")]
    LandIdMismatch,
    #[error("land not found")]
    LandNotFound,
    #[error("land is full")]
    LandFull,
    #[error("join denied: {0}")]
    JoinDenied(String),
    #[error("schema hash mismatch: expected {expected}, received {received}")]
    SchemaHashMismatch { expected: String, received: String },
    #[error("action not registered: {0}")]
    ActionNotRegistered(String),
    #[error("action handler error: {0}")]
    ActionHandler(#[source] anyhow::Error),
    #[error("event handler error: {0}")]
    EventHandler(#[source] anyhow::Error),
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),
}

impl LandError {
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            Self::SessionNotConnected => ErrorCode::JoinSessionNotConnected,
            Self::AlreadyJoined => ErrorCode::JoinAlreadyJoined,
            Self::LandIdMismatch => ErrorCode::JoinLandIdMismatch,
            Self::LandNotFound => ErrorCode::JoinRoomNotFound,
            Self::LandFull => ErrorCode::JoinRoomFull,
            Self::JoinDenied(_) => ErrorCode::JoinDenied,
            Self::SchemaHashMismatch { .. } => ErrorCode::JoinSchemaHashMismatch,
            Self::ActionNotRegistered(_) => ErrorCode::ActionNotRegistered,
            Self::ActionHandler(_) => ErrorCode::ActionHandlerError,
            Self::EventHandler(_) => ErrorCode::EventHandlerError,
            Self::Codec(_) => ErrorCode::InvalidMessageFormat,
        }
    }
}
