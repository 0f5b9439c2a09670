//! Error types for the room broker.

use thiserror::Error;

/// Malformed or absent join payload.
///
/// Any of these terminates the session before it is registered in a room.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("join payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("join payload is not a JSON object")]
    NotAnObject,

    #[error("join payload has no string 'room' field")]
    MissingRoom,

    #[error("room name is empty")]
    InvalidRoomName,
}

/// The broker or a room loop is no longer receiving events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("broker is no longer running")]
    BrokerUnavailable,

    #[error("room '{0}' is no longer running")]
    RoomUnavailable(String),
}

/// Reasons a session terminates.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Read or write failure reported by the transport
    #[error("transport error: {0}")]
    Transport(String),

    /// No liveness acknowledgment arrived before the read deadline
    #[error("read deadline exceeded")]
    ReadTimeout,

    /// A single frame could not be written within the write deadline
    #[error("write deadline exceeded")]
    WriteTimeout,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The join request was dropped before a room admitted the session
    #[error("join request was not admitted")]
    AdmissionRejected,

    /// The room dropped the session because its mailbox overflowed
    #[error("evicted from the room")]
    Evicted,

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether this error is an ordinary way for a connection to end.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ReadTimeout | Self::WriteTimeout)
    }
}
