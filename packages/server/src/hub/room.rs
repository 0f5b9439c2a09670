//! Room loop: one room's member set and broadcast fan-out.

use std::collections::HashMap;

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};

use crate::domain::{HubError, RoomId, RoomName, SessionId};

use super::{BrokerHandle, JoinRequest, Mailbox};

/// Events processed by a Room loop.
#[derive(Debug)]
pub enum RoomEvent {
    /// Admit a session; the room answers on `admission` with its handle.
    Register {
        member: Mailbox,
        admission: oneshot::Sender<RoomHandle>,
    },
    /// Remove a session. No-op if it is not a member.
    Unregister(SessionId),
    /// Fan a serialized envelope out to every current member. Dropped when
    /// `from` is not a member.
    Broadcast { from: SessionId, payload: String },
}

/// Identifies one Room instance in a teardown notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRef {
    pub id: RoomId,
    pub name: RoomName,
}

/// Cloneable address of a Room loop.
///
/// Sessions keep one as their back-reference after admission. It is only a
/// routing link: holding it does not keep the room alive, and sends to a
/// terminated room fail with [`HubError::RoomUnavailable`].
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    name: RoomName,
    events: mpsc::UnboundedSender<RoomEvent>,
}

impl RoomHandle {
    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn room_ref(&self) -> RoomRef {
        RoomRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub(crate) fn register(
        &self,
        member: Mailbox,
        admission: oneshot::Sender<RoomHandle>,
    ) -> Result<(), HubError> {
        self.send(RoomEvent::Register { member, admission })
    }

    pub fn unregister(&self, session: SessionId) -> Result<(), HubError> {
        self.send(RoomEvent::Unregister(session))
    }

    pub fn broadcast(&self, from: SessionId, payload: String) -> Result<(), HubError> {
        self.send(RoomEvent::Broadcast { from, payload })
    }

    fn send(&self, event: RoomEvent) -> Result<(), HubError> {
        self.events
            .send(event)
            .map_err(|_| HubError::RoomUnavailable(self.name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomState {
    /// Has members (or is about to receive its first one)
    Active,
    /// Teardown notice sent; waiting for the broker to shut the loop down
    Closing,
}

/// State owned by one Room loop.
pub struct Room {
    handle: RoomHandle,
    broker: BrokerHandle,
    members: HashMap<SessionId, Mailbox>,
    state: RoomState,
}

impl Room {
    pub fn new(name: RoomName, broker: BrokerHandle) -> (Self, mpsc::UnboundedReceiver<RoomEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let handle = RoomHandle {
            id: RoomId::generate(),
            name,
            events,
        };
        let room = Self {
            handle,
            broker,
            members: HashMap::new(),
            state: RoomState::Active,
        };
        (room, receiver)
    }

    /// Start a Room loop on the runtime.
    ///
    /// Returns the room's handle and its shutdown trigger. Firing (or
    /// dropping) the trigger terminates the loop once the events already
    /// queued have been processed.
    pub fn spawn(name: RoomName, broker: BrokerHandle) -> (RoomHandle, oneshot::Sender<()>) {
        let (room, events) = Self::new(name, broker);
        let handle = room.handle.clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(room.run(events, shutdown_rx));
        (handle, shutdown_tx)
    }

    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<RoomEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.handle(event),
                _ = &mut shutdown => break,
            }
        }
        tracing::info!(
            "Room '{}' ({}) terminated",
            self.handle.name,
            self.handle.id
        );
    }

    pub fn handle(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Register { member, admission } => self.register(member, admission),
            RoomEvent::Unregister(session) => self.unregister(session),
            RoomEvent::Broadcast { from, payload } => self.broadcast(from, payload),
        }
    }

    fn register(&mut self, member: Mailbox, admission: oneshot::Sender<RoomHandle>) {
        if self.state == RoomState::Closing {
            self.reroute(member, admission);
            return;
        }

        let session = member.owner();
        self.members.insert(session, member);
        if admission.send(self.handle.clone()).is_err() {
            tracing::warn!(
                "Session '{}' went away before being admitted to room '{}'",
                session,
                self.handle.name
            );
            self.unregister(session);
            return;
        }
        tracing::info!(
            "Session '{}' joined room '{}' ({} member(s))",
            session,
            self.handle.name,
            self.members.len()
        );
    }

    /// Hand a late registration back to the broker.
    ///
    /// The teardown notice was sent on the same channel earlier, so the
    /// broker removes this room before it sees the re-entry and the session
    /// lands in a fresh room.
    fn reroute(&self, member: Mailbox, admission: oneshot::Sender<RoomHandle>) {
        let session = member.owner();
        tracing::debug!(
            "Room '{}' is closing; rerouting session '{}' through the broker",
            self.handle.name,
            session
        );

        let request = JoinRequest {
            room: self.handle.name.clone(),
            session,
            admission,
        };
        let rerouted = self
            .broker
            .register_guest(member)
            .and_then(|()| self.broker.enter(request));
        if let Err(e) = rerouted {
            tracing::warn!("Failed to reroute session '{}': {}", session, e);
        }
    }

    fn unregister(&mut self, session: SessionId) {
        let Some(mailbox) = self.members.remove(&session) else {
            tracing::debug!(
                "Session '{}' is not a member of room '{}'; ignoring unregister",
                session,
                self.handle.name
            );
            return;
        };

        tracing::info!(
            "Session '{}' left room '{}' ({} member(s))",
            session,
            self.handle.name,
            self.members.len()
        );
        if self.members.is_empty() {
            self.begin_closing();
        }
        drop(mailbox);
    }

    fn broadcast(&mut self, from: SessionId, payload: String) {
        if !self.members.contains_key(&from) {
            tracing::debug!(
                "Session '{}' is not a member of room '{}'; dropping its broadcast",
                from,
                self.handle.name
            );
            return;
        }

        let mut evicted = Vec::new();
        for (session, mailbox) in &self.members {
            match mailbox.offer(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        "Mailbox of session '{}' is full; evicting it from room '{}'",
                        session,
                        self.handle.name
                    );
                    evicted.push(*session);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        "Session '{}' stopped reading; evicting it from room '{}'",
                        session,
                        self.handle.name
                    );
                    evicted.push(*session);
                }
            }
        }
        for session in &evicted {
            if let Some(mailbox) = self.members.remove(session) {
                mailbox.evict();
            }
        }

        tracing::debug!(
            "Broadcast in room '{}' delivered to {} member(s), evicted {}",
            self.handle.name,
            self.members.len(),
            evicted.len()
        );

        // Evictions can empty the room without any Unregister following.
        if !evicted.is_empty() && self.members.is_empty() {
            self.begin_closing();
        }
    }

    fn begin_closing(&mut self) {
        if self.state != RoomState::Active {
            return;
        }
        self.state = RoomState::Closing;
        tracing::info!("Room '{}' is empty; requesting teardown", self.handle.name);
        if let Err(e) = self.broker.notify_room_closed(self.handle.room_ref()) {
            tracing::warn!(
                "Failed to send teardown notice for room '{}': {}",
                self.handle.name,
                e
            );
        }
    }

    #[cfg(test)]
    fn member_ids(&self) -> std::collections::HashSet<SessionId> {
        self.members.keys().copied().collect()
    }
}
