//! Domain layer: identifiers, chat message types and error taxonomy.
//!
//! Nothing in this module touches channels or the transport; it is shared by
//! the hub (broker and room loops) and the session pumps.

pub mod error;
pub mod message;
pub mod value_object;

pub use error::{HubError, ProtocolError, SessionError};
pub use message::{Envelope, JoinIntent, normalize_text};
pub use value_object::{Profile, RoomId, RoomName, SessionId};
