//! Message-envelope codec: `Action | ActionResponse | Event | Join |
//! JoinResponse | Error`, in JSON-object, opcode-JSON-array, or
//! opcode-MessagePack-array form.
//!
//! Join frames are always JSON-decodable regardless of the negotiated
//! encoding, because the handshake has to happen before the client learns
//! which encoding the server picked.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state_update::CodecError;

/// Opcode assigned to each message kind.
pub const OPCODE_ACTION: u8 = 101;
pub const OPCODE_ACTION_RESPONSE: u8 = 102;
pub const OPCODE_EVENT: u8 = 103;
pub const OPCODE_JOIN: u8 = 104;
pub const OPCODE_JOIN_RESPONSE: u8 = 105;
pub const OPCODE_ERROR: u8 = 106;
pub const OPCODE_MERGED: u8 = 107;

/// Payload carried by an `event` frame: either a client-originated event
/// being relayed, or a server-originated one being pushed out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum EventBody {
    FromClient {
        #[serde(rename = "type")]
        event_type: String,
        payload: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_body: Option<Value>,
    },
    FromServer {
        #[serde(rename = "type")]
        event_type: String,
        payload: Value,
    },
}

/// One wire frame in the `TransportMessage` envelope. The
/// `join` request carries everything the join handshake needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
#[serde(rename_all = "camelCase")]
pub enum TransportMessage {
    #[serde(rename_all = "camelCase")]
    Action {
        request_id: String,
        type_identifier: String,
        /// base64(JSON) action payload.
        payload: String,
    },
    #[serde(rename_all = "camelCase")]
    ActionResponse { request_id: String, response: Value },
    Event(EventBody),
    #[serde(rename_all = "camelCase")]
    Join {
        request_id: String,
        land_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        land_instance_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        schema_hash: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    JoinResponse {
        request_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        land_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        land_instance_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_slot: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        encoding: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl TransportMessage {
    fn opcode(&self) -> u8 {
        match self {
            Self::Action { .. } => OPCODE_ACTION,
            Self::ActionResponse { .. } => OPCODE_ACTION_RESPONSE,
            Self::Event(_) => OPCODE_EVENT,
            Self::Join { .. } => OPCODE_JOIN,
            Self::JoinResponse { .. } => OPCODE_JOIN_RESPONSE,
            Self::Error { .. } => OPCODE_ERROR,
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(self, Self::Join { .. })
    }
}

/// Which wire shape a `MessageCodec` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MessageEncoding {
    #[default]
    JsonObject,
    OpcodeJsonArray,
    MessagePackOpcodeArray,
}

impl MessageEncoding {
    pub fn uses_messagepack(self) -> bool {
        matches!(self, Self::MessagePackOpcodeArray)
    }

    /// Encoders never hold cross-call state, so all three shapes are safe to
    /// call from a worker pool during parallel encoding.
    pub fn is_thread_safe(self) -> bool {
        true
    }

    pub fn as_wire_name(self) -> &'static str {
        match self {
            Self::JsonObject => "json",
            Self::OpcodeJsonArray => "opcode-json",
            Self::MessagePackOpcodeArray => "opcode-msgpack",
        }
    }
}

/// Stateless encode/decode for one land's message stream. Unlike
/// `StateUpdateCodec`, this codec carries no dictionary, so cloning or
/// sharing it across tasks is always safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec {
    pub encoding: MessageEncoding,
}

impl MessageCodec {
    pub fn new(encoding: MessageEncoding) -> Self {
        Self { encoding }
    }

    pub fn encode(&self, message: &TransportMessage) -> Result<Vec<u8>, CodecError> {
        let body = self.encode_body(message);
        match self.encoding {
            MessageEncoding::JsonObject | MessageEncoding::OpcodeJsonArray => {
                Ok(serde_json::to_vec(&body)?)
            }
            MessageEncoding::MessagePackOpcodeArray => Ok(rmp_serde::to_vec(&body)?),
        }
    }

    /// Encodes the body as a `Value` in this codec's shape, without
    /// serializing to bytes yet -- used by the merged 107-frame path, which
    /// needs the event body as a standalone MessagePack-decodable value.
    pub fn encode_body(&self, message: &TransportMessage) -> Value {
        match self.encoding {
            MessageEncoding::JsonObject => {
                serde_json::to_value(JsonObjectFrame::from(message)).unwrap_or(Value::Null)
            }
            MessageEncoding::OpcodeJsonArray | MessageEncoding::MessagePackOpcodeArray => {
                encode_opcode_array(message)
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<TransportMessage, CodecError> {
        match self.encoding {
            MessageEncoding::JsonObject => {
                Ok(serde_json::from_slice::<JsonObjectFrame>(bytes)?.into_message())
            }
            MessageEncoding::OpcodeJsonArray => {
                let value: Value = serde_json::from_slice(bytes)?;
                decode_opcode_array(&value)
            }
            MessageEncoding::MessagePackOpcodeArray => {
                let value: Value = rmp_serde::from_slice(bytes)?;
                decode_opcode_array(&value)
            }
        }
    }

    /// Joins are always JSON-object frames, independent of the negotiated
    /// encoding: the handshake precedes codec
    /// negotiation.
    pub fn decode_join(bytes: &[u8]) -> Result<TransportMessage, CodecError> {
        let frame: JsonObjectFrame = serde_json::from_slice(bytes)?;
        let message = frame.into_message();
        if !message.is_join() {
            return Err(CodecError::MalformedFrame(
                "expected a join frame".to_string(),
            ));
        }
        Ok(message)
    }
}

/// `{type, data}` shaped frame mirroring this crate's existing JSON message
/// convention; the type tag doubles as a human-readable opcode name.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
enum JsonObjectFrame {
    Action(ActionData),
    ActionResponse(ActionResponseData),
    Event(EventBody),
    Join(JoinData),
    JoinResponse(JoinResponseData),
    Error(ErrorData),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionData {
    request_id: String,
    type_identifier: String,
    payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionResponseData {
    request_id: String,
    response: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinData {
    request_id: String,
    land_type: String,
    #[serde(default)]
    land_instance_id: Option<String>,
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    schema_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinResponseData {
    request_id: String,
    success: bool,
    #[serde(default)]
    land_type: Option<String>,
    #[serde(default)]
    land_instance_id: Option<String>,
    #[serde(default)]
    player_slot: Option<i32>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorData {
    code: String,
    message: String,
    #[serde(default)]
    details: Option<Value>,
}

impl JsonObjectFrame {
    fn into_message(self) -> TransportMessage {
        match self {
            Self::Action(d) => TransportMessage::Action {
                request_id: d.request_id,
                type_identifier: d.type_identifier,
                payload: d.payload,
            },
            Self::ActionResponse(d) => TransportMessage::ActionResponse {
                request_id: d.request_id,
                response: d.response,
            },
            Self::Event(e) => TransportMessage::Event(e),
            Self::Join(d) => TransportMessage::Join {
                request_id: d.request_id,
                land_type: d.land_type,
                land_instance_id: d.land_instance_id,
                player_id: d.player_id,
                device_id: d.device_id,
                metadata: d.metadata,
                schema_hash: d.schema_hash,
            },
            Self::JoinResponse(d) => TransportMessage::JoinResponse {
                request_id: d.request_id,
                success: d.success,
                land_type: d.land_type,
                land_instance_id: d.land_instance_id,
                player_slot: d.player_slot,
                encoding: d.encoding,
                reason: d.reason,
            },
            Self::Error(d) => TransportMessage::Error {
                code: d.code,
                message: d.message,
                details: d.details,
            },
        }
    }
}

impl From<&TransportMessage> for JsonObjectFrame {
    fn from(message: &TransportMessage) -> Self {
        match message.clone() {
            TransportMessage::Action {
                request_id,
                type_identifier,
                payload,
            } => Self::Action(ActionData {
                request_id,
                type_identifier,
                payload,
            }),
            TransportMessage::ActionResponse {
                request_id,
                response,
            } => Self::ActionResponse(ActionResponseData {
                request_id,
                response,
            }),
            TransportMessage::Event(e) => Self::Event(e),
            TransportMessage::Join {
                request_id,
                land_type,
                land_instance_id,
                player_id,
                device_id,
                metadata,
                schema_hash,
            } => Self::Join(JoinData {
                request_id,
                land_type,
                land_instance_id,
                player_id,
                device_id,
                metadata,
                schema_hash,
            }),
            TransportMessage::JoinResponse {
                request_id,
                success,
                land_type,
                land_instance_id,
                player_slot,
                encoding,
                reason,
            } => Self::JoinResponse(JoinResponseData {
                request_id,
                success,
                land_type,
                land_instance_id,
                player_slot,
                encoding,
                reason,
            }),
            TransportMessage::Error {
                code,
                message,
                details,
            } => Self::Error(ErrorData {
                code,
                message,
                details,
            }),
        }
    }
}

impl Clone for TransportMessage {
    fn clone(&self) -> Self {
        match self {
            Self::Action {
                request_id,
                type_identifier,
                payload,
            } => Self::Action {
                request_id: request_id.clone(),
                type_identifier: type_identifier.clone(),
                payload: payload.clone(),
            },
            Self::ActionResponse {
                request_id,
                response,
            } => Self::ActionResponse {
                request_id: request_id.clone(),
                response: response.clone(),
            },
            Self::Event(e) => Self::Event(e.clone()),
            Self::Join {
                request_id,
                land_type,
                land_instance_id,
                player_id,
                device_id,
                metadata,
                schema_hash,
            } => Self::Join {
                request_id: request_id.clone(),
                land_type: land_type.clone(),
                land_instance_id: land_instance_id.clone(),
                player_id: player_id.clone(),
                device_id: device_id.clone(),
                metadata: metadata.clone(),
                schema_hash: schema_hash.clone(),
            },
            Self::JoinResponse {
                request_id,
                success,
                land_type,
                land_instance_id,
                player_slot,
                encoding,
                reason,
            } => Self::JoinResponse {
                request_id: request_id.clone(),
                success: *success,
                land_type: land_type.clone(),
                land_instance_id: land_instance_id.clone(),
                player_slot: *player_slot,
                encoding: encoding.clone(),
                reason: reason.clone(),
            },
            Self::Error {
                code,
                message,
                details,
            } => Self::Error {
                code: code.clone(),
                message: message.clone(),
                details: details.clone(),
            },
        }
    }
}

fn encode_opcode_array(message: &TransportMessage) -> Value {
    let opcode = message.opcode();
    let body = match message {
        TransportMessage::Action {
            request_id,
            type_identifier,
            payload,
        } => json!({"requestID": request_id, "typeIdentifier": type_identifier, "payload": payload}),
        TransportMessage::ActionResponse {
            request_id,
            response,
        } => json!({"requestID": request_id, "response": response}),
        TransportMessage::Event(EventBody::FromClient {
            event_type,
            payload,
            raw_body,
        }) => json!({"fromClient": {"type": event_type, "payload": payload, "rawBody": raw_body}}),
        TransportMessage::Event(EventBody::FromServer {
            event_type,
            payload,
        }) => json!({"fromServer": {"type": event_type, "payload": payload}}),
        TransportMessage::Join {
            request_id,
            land_type,
            land_instance_id,
            player_id,
            device_id,
            metadata,
            schema_hash,
        } => json!({
            "requestID": request_id,
            "landType": land_type,
            "landInstanceId": land_instance_id,
            "playerID": player_id,
            "deviceID": device_id,
            "metadata": metadata,
            "schemaHash": schema_hash,
        }),
        TransportMessage::JoinResponse {
            request_id,
            success,
            land_type,
            land_instance_id,
            player_slot,
            encoding,
            reason,
        } => json!({
            "requestID": request_id,
            "success": success,
            "landType": land_type,
            "landInstanceId": land_instance_id,
            "playerSlot": player_slot,
            "encoding": encoding,
            "reason": reason,
        }),
        TransportMessage::Error {
            code,
            message,
            details,
        } => json!({"code": code, "message": message, "details": details}),
    };
    json!([opcode, body])
}

fn decode_opcode_array(value: &Value) -> Result<TransportMessage, CodecError> {
    let array = value
        .as_array()
        .ok_or_else(|| CodecError::MalformedFrame("expected [opcode, body]".to_string()))?;
    if array.len() != 2 {
        return Err(CodecError::MalformedFrame(
            "opcode array frame must have exactly 2 elements".to_string(),
        ));
    }
    let opcode = array[0]
        .as_u64()
        .ok_or_else(|| CodecError::MalformedFrame("opcode must be an integer".to_string()))?;
    let body = &array[1];
    let get_str = |key: &str| -> Result<String, CodecError> {
        body.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CodecError::MalformedFrame(format!("missing field {key}")))
    };

    match opcode as u8 {
        OPCODE_ACTION => Ok(TransportMessage::Action {
            request_id: get_str("requestID")?,
            type_identifier: get_str("typeIdentifier")?,
            payload: get_str("payload")?,
        }),
        OPCODE_ACTION_RESPONSE => Ok(TransportMessage::ActionResponse {
            request_id: get_str("requestID")?,
            response: body.get("response").cloned().unwrap_or(Value::Null),
        }),
        OPCODE_EVENT => {
            if let Some(from_client) = body.get("fromClient") {
                Ok(TransportMessage::Event(EventBody::FromClient {
                    event_type: from_client
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    payload: from_client.get("payload").cloned().unwrap_or(Value::Null),
                    raw_body: from_client.get("rawBody").cloned(),
                }))
            } else if let Some(from_server) = body.get("fromServer") {
                Ok(TransportMessage::Event(EventBody::FromServer {
                    event_type: from_server
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    payload: from_server.get("payload").cloned().unwrap_or(Value::Null),
                }))
            } else {
                Err(CodecError::MalformedFrame(
                    "event frame missing fromClient/fromServer".to_string(),
                ))
            }
        }
        OPCODE_JOIN => Ok(TransportMessage::Join {
            request_id: get_str("requestID")?,
            land_type: get_str("landType")?,
            land_instance_id: body
                .get("landInstanceId")
                .and_then(Value::as_str)
                .map(str::to_string),
            player_id: body
                .get("playerID")
                .and_then(Value::as_str)
                .map(str::to_string),
            device_id: body
                .get("deviceID")
                .and_then(Value::as_str)
                .map(str::to_string),
            metadata: body.get("metadata").cloned(),
            schema_hash: body
                .get("schemaHash")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        OPCODE_JOIN_RESPONSE => Ok(TransportMessage::JoinResponse {
            request_id: get_str("requestID")?,
            success: body.get("success").and_then(Value::as_bool).unwrap_or(false),
            land_type: body
                .get("landType")
                .and_then(Value::as_str)
                .map(str::to_string),
            land_instance_id: body
                .get("landInstanceId")
                .and_then(Value::as_str)
                .map(str::to_string),
            player_slot: body
                .get("playerSlot")
                .and_then(Value::as_i64)
                .map(|v| v as i32),
            encoding: body
                .get("encoding")
                .and_then(Value::as_str)
                .map(str::to_string),
            reason: body.get("reason").and_then(Value::as_str).map(str::to_string),
        }),
        OPCODE_ERROR => Ok(TransportMessage::Error {
            code: get_str("code")?,
            message: get_str("message")?,
            details: body.get("details").cloned(),
        }),
        other => Err(CodecError::MalformedFrame(format!(
            "unknown message opcode {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_join() -> TransportMessage {
        TransportMessage::Join {
            request_id: "r1".to_string(),
            land_type: "arena".to_string(),
            land_instance_id: None,
            player_id: Some("alice".to_string()),
            device_id: None,
            metadata: None,
            schema_hash: None,
        }
    }

    #[test]
    fn json_object_round_trips_join() {
        let codec = MessageCodec::new(MessageEncoding::JsonObject);
        let msg = sample_join();
        let bytes = codec.encode(&msg).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn opcode_json_round_trips_error() {
        let codec = MessageCodec::new(MessageEncoding::OpcodeJsonArray);
        let msg = TransportMessage::Error {
            code: "JOIN_ROOM_FULL".to_string(),
            message: "full".to_string(),
            details: None,
        };
        let bytes = codec.encode(&msg).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[0], json!(106));
        assert_eq!(codec.decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn messagepack_round_trips_action_response() {
        let codec = MessageCodec::new(MessageEncoding::MessagePackOpcodeArray);
        let msg = TransportMessage::ActionResponse {
            request_id: "r7".to_string(),
            response: json!({"ok": true}),
        };
        let bytes = codec.encode(&msg).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn join_decodes_as_json_regardless_of_negotiated_encoding() {
        let msg = sample_join();
        let bytes = serde_json::to_vec(&JsonObjectFrame::from(&msg)).unwrap();
        assert_eq!(MessageCodec::decode_join(&bytes).unwrap(), msg);
    }

    #[test]
    fn decode_join_rejects_non_join_frames() {
        let msg = TransportMessage::Error {
            code: "X".to_string(),
            message: "y".to_string(),
            details: None,
        };
        let bytes = serde_json::to_vec(&JsonObjectFrame::from(&msg)).unwrap();
        assert!(MessageCodec::decode_join(&bytes).is_err());
    }
}
