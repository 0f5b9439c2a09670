//! Outbound loop: mailbox → transport, plus keepalive probes.

use std::{fmt::Display, time::Duration};

use futures_util::{Sink, SinkExt};
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, timeout},
};

use crate::{domain::SessionError, hub::Inbox};

use super::frame::Frame;

/// Drain the mailbox to the transport until the mailbox is closed, a write
/// fails, or the room evicts the session.
///
/// A closed mailbox means the session was removed from its container; a
/// close frame is written before returning. Eviction stops immediately,
/// even in the middle of a write, and leaves the backlog unsent.
pub(super) async fn run<K>(
    inbox: Inbox,
    mut sink: K,
    ping_period: Duration,
    write_wait: Duration,
) -> Result<(), SessionError>
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    let (mailbox, evicted) = inbox.into_parts();
    tokio::select! {
        result = pump(mailbox, &mut sink, ping_period, write_wait) => result,
        Ok(()) = evicted => Err(SessionError::Evicted),
    }
}

async fn pump<K>(
    mut mailbox: mpsc::Receiver<String>,
    sink: &mut K,
    ping_period: Duration,
    write_wait: Duration,
) -> Result<(), SessionError>
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    let mut keepalive = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            payload = mailbox.recv() => match payload {
                Some(payload) => write(sink, Frame::Text(payload), write_wait).await?,
                None => {
                    write(sink, Frame::Close, write_wait).await?;
                    let _ = timeout(write_wait, sink.close()).await;
                    return Ok(());
                }
            },
            _ = keepalive.tick() => write(sink, Frame::Ping, write_wait).await?,
        }
    }
}

async fn write<K>(sink: &mut K, frame: Frame, write_wait: Duration) -> Result<(), SessionError>
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    match timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionError::Transport(e.to_string())),
        Err(_) => Err(SessionError::WriteTimeout),
    }
}
