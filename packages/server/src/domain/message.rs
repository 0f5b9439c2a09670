//! Chat message types.

use super::value_object::{Profile, RoomName};

/// Parsed first payload of a session: which room to enter, as whom.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinIntent {
    pub room: RoomName,
    pub profile: Profile,
}

/// One broadcast: the sender's profile and the normalized text.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub profile: Profile,
    pub text: String,
}

impl Envelope {
    /// Build an envelope, normalizing `raw_text` on the way in.
    pub fn new(profile: Profile, raw_text: &str) -> Self {
        Self {
            profile,
            text: normalize_text(raw_text),
        }
    }
}

/// Collapse embedded line breaks to single spaces and trim the result.
///
/// `\r\n`, `\n` and `\r` each count as one line break.
pub fn normalize_text(raw: &str) -> String {
    raw.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}
