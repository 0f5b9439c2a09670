//! Conversion logic between DTOs and domain models.

use serde_json::Value;

use crate::domain::{Envelope, JoinIntent, Profile, ProtocolError, RoomName};
use crate::infrastructure::dto::websocket::{EnvelopeMessage, JoinMessage};

// ========================================
// DTO → Domain Model
// ========================================

impl TryFrom<JoinMessage> for JoinIntent {
    type Error = ProtocolError;

    /// `room` must be a non-blank string. A `user` that is missing or is not
    /// an object yields an empty profile.
    fn try_from(dto: JoinMessage) -> Result<Self, Self::Error> {
        let room = match dto.room {
            Some(Value::String(name)) => RoomName::new(name)?,
            _ => return Err(ProtocolError::MissingRoom),
        };
        let profile = match dto.user {
            Some(Value::Object(fields)) => Profile::new(fields),
            _ => Profile::default(),
        };
        Ok(Self { room, profile })
    }
}

// ========================================
// Domain Model → DTO
// ========================================

impl From<&Envelope> for EnvelopeMessage {
    fn from(model: &Envelope) -> Self {
        Self {
            user: model.profile.fields().clone(),
            text: model.text.clone(),
        }
    }
}

impl From<Envelope> for EnvelopeMessage {
    fn from(model: Envelope) -> Self {
        Self::from(&model)
    }
}
