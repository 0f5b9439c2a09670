//! Inbound loop: transport → broker / room.

use std::{fmt::Display, time::Duration};

use futures_util::{Stream, StreamExt};
use tokio::{sync::oneshot, time::Instant};

use crate::{
    domain::{Envelope, JoinIntent, Profile, SessionError, SessionId},
    hub::{BrokerHandle, JoinRequest, RoomHandle},
    infrastructure::dto::websocket::{EnvelopeMessage, JoinMessage},
};

use super::frame::Frame;

/// State of a session's inbound side.
///
/// `room` is the back-reference to the admitting room. It is written once,
/// from the admission reply, and only read afterwards.
pub(super) struct Inbound {
    session: SessionId,
    broker: BrokerHandle,
    pong_wait: Duration,
    deadline: Instant,
    profile: Profile,
    room: Option<RoomHandle>,
}

impl Inbound {
    pub(super) fn new(session: SessionId, broker: BrokerHandle, pong_wait: Duration) -> Self {
        Self {
            session,
            broker,
            pong_wait,
            deadline: Instant::now() + pong_wait,
            profile: Profile::default(),
            room: None,
        }
    }

    /// Read frames until the peer goes away, a frame is rejected, or the
    /// outbound loop stops.
    pub(super) async fn run<S, E>(
        &mut self,
        mut stream: S,
        mut outbound_done: oneshot::Receiver<()>,
    ) -> Result<(), SessionError>
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: Display,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = &mut outbound_done => {
                    tracing::debug!("Outbound loop of session '{}' stopped", self.session);
                    return Ok(());
                }
                next = tokio::time::timeout_at(self.deadline, stream.next()) => {
                    next.map_err(|_| SessionError::ReadTimeout)?
                }
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(SessionError::Transport(e.to_string())),
                None => return Ok(()),
            };

            if let Some(payload) = frame.payload() {
                self.on_payload(&payload).await?;
                continue;
            }
            match frame {
                Frame::Pong => self.deadline = Instant::now() + self.pong_wait,
                Frame::Close => return Ok(()),
                // The transport answers pings itself.
                _ => {}
            }
        }
    }

    async fn on_payload(&mut self, payload: &str) -> Result<(), SessionError> {
        let Some(room) = &self.room else {
            return self.join(payload).await;
        };

        let envelope = Envelope::new(self.profile.clone(), payload);
        let encoded = EnvelopeMessage::from(&envelope).encode()?;
        tracing::debug!(
            "Session '{}' broadcasts to room '{}': {}",
            self.session,
            room.name(),
            envelope.text
        );
        room.broadcast(self.session, encoded)?;
        Ok(())
    }

    /// Treat `payload` as the join intent and wait until a room admits us.
    async fn join(&mut self, payload: &str) -> Result<(), SessionError> {
        let intent = JoinIntent::try_from(JoinMessage::decode(payload)?)?;
        tracing::info!(
            "Session '{}' requests room '{}'",
            self.session,
            intent.room
        );

        let (request, admission) = JoinRequest::new(intent.room, self.session);
        self.broker.enter(request)?;
        let room = admission
            .await
            .map_err(|_| SessionError::AdmissionRejected)?;

        self.profile = intent.profile;
        self.room = Some(room);
        Ok(())
    }

    /// Unregister from whichever container currently owns the session.
    pub(super) fn leave(&self) {
        let result = match &self.room {
            Some(room) => room.unregister(self.session),
            None => self.broker.unregister_guest(self.session),
        };
        if let Err(e) = result {
            tracing::debug!("Unregister of session '{}' skipped: {}", self.session, e);
        }
    }
}
