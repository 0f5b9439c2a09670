//! WebSocket message DTOs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::ProtocolError;

/// First payload sent by a client: `{ "user": {...}, "room": "..." }`.
///
/// Both fields are kept as raw JSON values so that a wrong type can be told
/// apart from a missing field during conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Value>,
}

impl JoinMessage {
    /// Decode a join payload. Only JSON objects are accepted.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

/// Payload delivered to every member of a room: `{ "user": {...}, "text": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    pub user: Map<String, Value>,
    pub text: String,
}

impl EnvelopeMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
