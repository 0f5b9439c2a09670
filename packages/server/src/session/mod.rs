//! Session: bridges one transport connection to the broker and its room.
//!
//! ## Loops
//!
//! - inbound (runs in the caller's task): decodes the first payload as the
//!   join intent, then forwards every further payload to the room as a
//!   broadcast. On exit it unregisters the session from whichever container
//!   owns it, exactly once.
//! - outbound (spawned): drains the mailbox to the transport and sends
//!   keepalive probes. Ends when the mailbox closes or a write fails, and
//!   tells the inbound loop so.
//!
//! The transport is any `Stream` of inbound [`Frame`]s plus any `Sink` of
//! outbound ones; the WebSocket handler adapts axum's socket to that shape.

mod frame;
mod inbound;
mod outbound;

use std::fmt::Display;

use futures_util::{Sink, Stream};
use tokio::sync::oneshot;

use crate::{
    config::SessionConfig,
    domain::{SessionError, SessionId},
    hub::{BrokerHandle, Mailbox},
};

pub use frame::Frame;

use inbound::Inbound;

/// One connection's bridge to the broker.
pub struct Session {
    id: SessionId,
    broker: BrokerHandle,
    config: SessionConfig,
}

impl Session {
    pub fn new(broker: BrokerHandle, config: SessionConfig) -> Self {
        Self {
            id: SessionId::generate(),
            broker,
            config,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Register as a guest and run both loops until the connection ends.
    pub async fn run<S, E, K>(self, stream: S, sink: K)
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: Display,
        K: Sink<Frame> + Unpin + Send + 'static,
        K::Error: Display + Send,
    {
        let (mailbox, inbox) = Mailbox::new(self.id, self.config.mailbox_capacity);
        if let Err(e) = self.broker.register_guest(mailbox) {
            tracing::warn!("Session '{}' rejected: {}", self.id, e);
            return;
        }
        tracing::info!("Session '{}' connected", self.id);

        let (done_tx, done_rx) = oneshot::channel();
        let session = self.id;
        let ping_period = self.config.ping_period;
        let write_wait = self.config.write_wait;
        let outbound = tokio::spawn(async move {
            match outbound::run(inbox, sink, ping_period, write_wait).await {
                Ok(()) => {}
                Err(SessionError::Evicted) => {
                    tracing::warn!("Session '{}' was evicted; closing connection", session)
                }
                Err(e) => tracing::debug!("Outbound loop of session '{}' ended: {}", session, e),
            }
            let _ = done_tx.send(());
        });

        let mut inbound = Inbound::new(self.id, self.broker.clone(), self.config.pong_wait);
        match inbound.run(stream, done_rx).await {
            Ok(()) => tracing::info!("Session '{}' disconnected", self.id),
            Err(e) if e.is_disconnect() => {
                tracing::info!("Session '{}' disconnected: {}", self.id, e)
            }
            Err(e) => tracing::warn!("Session '{}' terminated: {}", self.id, e),
        }
        inbound.leave();

        if let Err(e) = outbound.await {
            tracing::warn!("Outbound task of session '{}' failed: {}", self.id, e);
        }
    }
}
