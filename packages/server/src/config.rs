//! Session tuning parameters.

use std::time::Duration;

/// Default number of payloads a session's mailbox can hold.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;
/// Default time allowed between liveness acknowledgments from the peer.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);
/// Default time allowed to write a single frame to the peer.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);
/// Smallest accepted read deadline. Keeps the keepalive period non-zero.
pub const MIN_PONG_WAIT: Duration = Duration::from_millis(1);
/// Default maximum size of one inbound message, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;

/// Per-session settings shared by every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Capacity of the bounded outbound mailbox
    pub mailbox_capacity: usize,
    /// Read deadline, refreshed by every liveness acknowledgment
    pub pong_wait: Duration,
    /// Keepalive probe period; always shorter than `pong_wait`
    pub ping_period: Duration,
    /// Deadline for a single transport write
    pub write_wait: Duration,
    /// Maximum inbound message size accepted by the transport
    pub max_message_size: usize,
}

impl SessionConfig {
    /// Build a config, deriving the keepalive period as 9/10 of `pong_wait`.
    ///
    /// `pong_wait` is raised to [`MIN_PONG_WAIT`] and `mailbox_capacity` to one.
    pub fn new(
        mailbox_capacity: usize,
        pong_wait: Duration,
        write_wait: Duration,
        max_message_size: usize,
    ) -> Self {
        let pong_wait = pong_wait.max(MIN_PONG_WAIT);
        Self {
            mailbox_capacity: mailbox_capacity.max(1),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            write_wait,
            max_message_size,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAILBOX_CAPACITY,
            DEFAULT_PONG_WAIT,
            DEFAULT_WRITE_WAIT,
            DEFAULT_MAX_MESSAGE_SIZE,
        )
    }
}
