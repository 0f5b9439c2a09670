//! Transport-neutral frames.

/// One message on a bidirectional, message-oriented connection.
///
/// The transport layer converts its own message type to and from this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Keepalive probe
    Ping,
    /// Liveness acknowledgment
    Pong,
    Close,
}

impl Frame {
    /// Payload carried by a data frame. Binary data is decoded as UTF-8,
    /// replacing invalid sequences.
    pub fn payload(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Binary(data) => Some(String::from_utf8_lossy(data).into_owned()),
            Self::Ping | Self::Pong | Self::Close => None,
        }
    }
}
