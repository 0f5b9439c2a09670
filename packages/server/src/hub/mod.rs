//! Room broker: the Broker loop, one Room loop per active room, and the
//! messages exchanged between them and the sessions.
//!
//! ## Ownership of a session's mailbox
//!
//! The sending half of a session's mailbox ([`Mailbox`]) is its membership
//! token. Exactly one container owns it at a time: the Broker's guest set
//! while the session waits for a room, then one Room's member set. Closing a
//! mailbox means dropping that single sender, so a mailbox can never be
//! closed twice and a session can never sit in two containers.
//!
//! ## Loops
//!
//! - [`Broker`] owns the room directory and the guest set.
//! - [`Room`] owns one room's member set and fans out broadcasts.
//!
//! Both are mutated only from their own loop; everything else talks to them
//! through [`BrokerHandle`] and [`RoomHandle`].

mod broker;
mod room;

use tokio::sync::{mpsc, oneshot};

use crate::domain::{RoomName, SessionId};

pub use broker::{Broker, BrokerEvent, BrokerHandle};
pub use room::{Room, RoomEvent, RoomHandle, RoomRef};

/// Sending half of a session's bounded outbound queue.
///
/// Dropping it closes the queue once the session has drained it. Evicting it
/// also tells the session to stop at once, without draining.
#[derive(Debug)]
pub struct Mailbox {
    owner: SessionId,
    sender: mpsc::Sender<String>,
    eviction: oneshot::Sender<()>,
}

impl Mailbox {
    /// Create a mailbox for `owner` holding at most `capacity` payloads.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(owner: SessionId, capacity: usize) -> (Self, Inbox) {
        let (sender, payloads) = mpsc::channel(capacity.max(1));
        let (eviction, evicted) = oneshot::channel();
        (
            Self {
                owner,
                sender,
                eviction,
            },
            Inbox { payloads, evicted },
        )
    }

    pub fn owner(&self) -> SessionId {
        self.owner
    }

    /// Enqueue without waiting. Fails when the queue is full or the session
    /// has stopped draining it.
    pub fn offer(&self, payload: String) -> Result<(), mpsc::error::TrySendError<String>> {
        self.sender.try_send(payload)
    }

    /// Close the mailbox and make the owning session terminate.
    pub fn evict(self) {
        let _ = self.eviction.send(());
    }
}

/// Receiving half of a [`Mailbox`], owned by the session's outbound loop.
#[derive(Debug)]
pub struct Inbox {
    payloads: mpsc::Receiver<String>,
    evicted: oneshot::Receiver<()>,
}

impl Inbox {
    pub async fn recv(&mut self) -> Option<String> {
        self.payloads.recv().await
    }

    pub fn try_recv(&mut self) -> Result<String, mpsc::error::TryRecvError> {
        self.payloads.try_recv()
    }

    /// Split into the payload queue and the eviction signal. The signal
    /// resolves with `Ok` only when the mailbox was evicted, not when it was
    /// merely dropped.
    pub(crate) fn into_parts(self) -> (mpsc::Receiver<String>, oneshot::Receiver<()>) {
        (self.payloads, self.evicted)
    }

    #[cfg(test)]
    pub(crate) fn is_evicted(&mut self) -> bool {
        self.evicted.try_recv().is_ok()
    }
}

/// A session's request to enter a room. Consumed exactly once.
///
/// The admitting room answers on `admission` with its handle. If the request
/// is dropped instead, the session sees the channel close and terminates.
#[derive(Debug)]
pub struct JoinRequest {
    pub room: RoomName,
    pub session: SessionId,
    pub admission: oneshot::Sender<RoomHandle>,
}

impl JoinRequest {
    pub fn new(
        room: RoomName,
        session: SessionId,
    ) -> (Self, oneshot::Receiver<RoomHandle>) {
        let (admission, receiver) = oneshot::channel();
        (
            Self {
                room,
                session,
                admission,
            },
            receiver,
        )
    }
}
