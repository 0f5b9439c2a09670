//! WebSocket connection handler.
//!
//! Upgrades the HTTP request, then adapts axum's socket to the frame stream
//! and sink a [`Session`] runs on.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, future};

use crate::{
    session::{Frame, Session},
    ui::state::AppState,
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let session = Session::new(state.broker.clone(), state.config.clone());
    tracing::debug!("Upgrading connection for session '{}'", session.id());

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, session))
}

async fn handle_socket(socket: WebSocket, session: Session) {
    let (sender, receiver) = socket.split();
    let stream = receiver.map(|message| message.map(Frame::from));
    let sink = sender.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));

    session.run(stream, sink).await;
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(data) => Self::Binary(data.to_vec()),
            Message::Ping(_) => Self::Ping,
            Message::Pong(_) => Self::Pong,
            Message::Close(_) => Self::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Binary(data) => Self::Binary(data.into()),
            Frame::Ping => Self::Ping(Default::default()),
            Frame::Pong => Self::Pong(Default::default()),
            Frame::Close => Self::Close(None),
        }
    }
}
