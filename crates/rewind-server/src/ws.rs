//! `WebSocket` session handler.
//!
//! Clients connect to `GET /ws`. Each connection becomes one session task
//! that registers a default clock estimate, then `select!`s over three
//! sources until one ends it:
//!
//! - the position broadcast, forwarded as `position` frames
//! - inbound client frames, handed to [`dispatch`](crate::dispatch::dispatch)
//! - the server's shutdown signal
//!
//! If a client falls behind the broadcast, lagged positions are skipped
//! and the client resumes from the newest one. Every write is bounded by
//! the configured write timeout; a client that cannot take a frame in time
//! is disconnected. The registry entry is removed before the task returns,
//! whatever the reason it ends.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use rewind_types::{ServerMessage, SessionId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::dispatch::{dispatch, error_reply, parse_frame};
use crate::state::AppState;

/// Why a session task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection.
    ClientClosed,
    /// Reading from or writing to the socket failed.
    Transport,
    /// A write did not complete within the write timeout.
    WriteTimeout,
    /// The server is shutting down.
    ServerShutdown,
}

/// Upgrade an HTTP request to a `WebSocket` session.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_session(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| async move {
        handle_session(socket, state).await;
    })
}

/// Handle the session lifecycle: register, run until the socket, the
/// broadcast, or the server ends it, unregister.
async fn handle_session<S, E>(mut socket: S, state: Arc<AppState>) -> SessionEnd
where
    S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let session = state.sessions.connect().await;
    info!(%session, "Client connected");

    let end = run_session(&mut socket, &state, session).await;

    state.sessions.disconnect(session).await;
    info!(%session, reason = ?end, "Client disconnected");
    end
}

async fn run_session<S, E>(socket: &mut S, state: &AppState, session: SessionId) -> SessionEnd
where
    S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let mut rx = state.subscribe();
    let mut shutdown = state.shutdown_signal();

    loop {
        tokio::select! {
            _ = async { shutdown.wait_for(|closed| *closed).await.is_ok() } => {
                return SessionEnd::ServerShutdown;
            }
            // Forward the next tick position.
            result = rx.recv() => {
                match result {
                    Ok(position) => {
                        let msg = ServerMessage::Position(position);
                        if let Err(end) = send(socket, &msg, state.write_timeout).await {
                            return end;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(%session, skipped = n, "Client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        return SessionEnd::ServerShutdown;
                    }
                }
            }
            // Handle whatever the client sent.
            msg = socket.next() => {
                let received_at = state.clock.now_ms();
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(state, session, text.as_str(), received_at).await
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => handle_frame(state, session, text, received_at).await,
                        Err(e) => {
                            debug!(%session, "Binary frame is not UTF-8: {e}");
                            Some(error_reply("binary frames must carry UTF-8 JSON"))
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(end) = write(socket, Message::Pong(data), state.write_timeout).await {
                            return end;
                        }
                        None
                    }
                    Some(Ok(Message::Pong(_))) => None,
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::ClientClosed,
                    Some(Err(e)) => {
                        debug!(%session, "WebSocket error: {e}");
                        return SessionEnd::Transport;
                    }
                };

                if let Some(reply) = reply {
                    if let Err(end) = send(socket, &reply, state.write_timeout).await {
                        return end;
                    }
                }
            }
        }
    }
}

async fn handle_frame(
    state: &AppState,
    session: SessionId,
    text: &str,
    received_at: i64,
) -> Option<ServerMessage> {
    match parse_frame(text) {
        Ok(message) => dispatch(state, session, message, received_at).await,
        Err(reply) => {
            debug!(%session, frame = text, "Ignoring malformed message");
            Some(reply)
        }
    }
}

/// Serialize and write one message, bounded by `timeout`.
async fn send<S, E>(socket: &mut S, message: &ServerMessage, timeout: Duration) -> Result<(), SessionEnd>
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let json = match serde_json::to_string(message) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize server message: {e}");
            return Ok(());
        }
    };

    write(socket, Message::Text(json.into()), timeout).await
}

/// Write one frame, bounded by `timeout`.
async fn write<S, E>(socket: &mut S, frame: Message, timeout: Duration) -> Result<(), SessionEnd>
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    match tokio::time::timeout(timeout, socket.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!("WebSocket send failed: {e}");
            Err(SessionEnd::Transport)
        }
        Err(_) => {
            warn!(?timeout, "WebSocket write timed out");
            Err(SessionEnd::WriteTimeout)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use rewind_core::clock::ServerClock;
    use rewind_core::config::RewindConfig;
    use rewind_core::history::PositionHistory;
    use rewind_types::{Coordinates, Position};
    use serde_json::Value;

    use super::*;

    /// In-memory socket that yields a fixed list of inbound frames and
    /// records every frame written to it.
    #[derive(Default)]
    struct ScriptedSocket {
        inbound: VecDeque<Result<Message, io::Error>>,
        /// Stay open (pending) once the inbound frames run out.
        hold_open: bool,
        /// Never accept a write.
        stalled: bool,
        sent: Vec<Message>,
    }

    impl ScriptedSocket {
        fn with_frames(frames: impl IntoIterator<Item = Result<Message, io::Error>>) -> Self {
            Self {
                inbound: frames.into_iter().collect(),
                ..Self::default()
            }
        }

        fn sent_json(&self) -> Vec<Value> {
            self.sent
                .iter()
                .filter_map(|m| match m {
                    Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
                    _ => None,
                })
                .collect()
        }
    }

    impl Stream for ScriptedSocket {
        type Item = Result<Message, io::Error>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            match self.inbound.pop_front() {
                Some(frame) => Poll::Ready(Some(frame)),
                None if self.hold_open => Poll::Pending,
                None => Poll::Ready(None),
            }
        }
    }

    impl Sink<Message> for ScriptedSocket {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            if self.stalled {
                Poll::Pending
            } else {
                Poll::Ready(Ok(()))
            }
        }

        fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), io::Error> {
            self.sent.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn state_with(config: &RewindConfig) -> Arc<AppState> {
        Arc::new(AppState::new(
            config,
            ServerClock::start(),
            PositionHistory::shared(10).unwrap(),
        ))
    }

    fn text(frame: &str) -> Result<Message, io::Error> {
        Ok(Message::Text(frame.into()))
    }

    #[tokio::test]
    async fn closed_stream_ends_session_and_unregisters() {
        let state = state_with(&RewindConfig::default());
        let mut socket = ScriptedSocket::with_frames([text(r#"{"type":"ping"}"#)]);

        let end = handle_session(&mut socket, Arc::clone(&state)).await;

        assert_eq!(end, SessionEnd::ClientClosed);
        assert!(state.sessions.is_empty().await);
        let replies = socket.sent_json();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["type"], "pong");
    }

    #[tokio::test]
    async fn close_frame_ends_session_and_unregisters() {
        let state = state_with(&RewindConfig::default());
        let mut socket = ScriptedSocket::with_frames([Ok(Message::Close(None))]);
        socket.hold_open = true;

        let end = handle_session(&mut socket, Arc::clone(&state)).await;

        assert_eq!(end, SessionEnd::ClientClosed);
        assert!(state.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn transport_error_unregisters() {
        let state = state_with(&RewindConfig::default());
        let mut socket = ScriptedSocket::with_frames([Err(io::Error::other("connection reset"))]);

        let end = handle_session(&mut socket, Arc::clone(&state)).await;

        assert_eq!(end, SessionEnd::Transport);
        assert!(state.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn stalled_client_is_dropped_after_write_timeout() {
        let mut config = RewindConfig::default();
        config.server.write_timeout_ms = 20;
        let state = state_with(&config);
        let mut socket = ScriptedSocket::with_frames([text(r#"{"type":"ping"}"#)]);
        socket.hold_open = true;
        socket.stalled = true;

        let started = tokio::time::Instant::now();
        let end = tokio::time::timeout(
            Duration::from_secs(5),
            handle_session(&mut socket, Arc::clone(&state)),
        )
        .await
        .unwrap();

        assert_eq!(end, SessionEnd::WriteTimeout);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(state.sessions.is_empty().await);
        assert!(socket.sent.is_empty());
    }

    #[tokio::test]
    async fn malformed_frames_get_an_error_and_the_session_continues() {
        let state = state_with(&RewindConfig::default());
        let mut socket = ScriptedSocket::with_frames([
            text("{not json"),
            Ok(Message::Binary(vec![0xff, 0xfe].into())),
            text(r#"{"type":"ping"}"#),
        ]);

        let end = handle_session(&mut socket, Arc::clone(&state)).await;

        assert_eq!(end, SessionEnd::ClientClosed);
        let types: Vec<Value> = socket.sent_json().iter().map(|v| v["type"].clone()).collect();
        assert_eq!(types, vec!["error", "error", "pong"]);
    }

    #[tokio::test]
    async fn positions_are_forwarded_until_shutdown() {
        let state = state_with(&RewindConfig::default());
        let mut socket = ScriptedSocket {
            hold_open: true,
            ..ScriptedSocket::default()
        };
        let position = Position::new(Coordinates::new(3.0, 1.0, 4.0), 0, 75);

        let (end, ()) = tokio::join!(handle_session(&mut socket, Arc::clone(&state)), async {
            while state.sessions.is_empty().await {
                tokio::task::yield_now().await;
            }
            state.publish(&position);
            tokio::time::sleep(Duration::from_millis(20)).await;
            state.close_sessions();
        });

        assert_eq!(end, SessionEnd::ServerShutdown);
        assert!(state.sessions.is_empty().await);
        let frames = socket.sent_json();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "position");
        assert_eq!(frames[0]["serverTime"], 75);
    }

    #[tokio::test]
    async fn sessions_opened_after_shutdown_end_at_once() {
        let state = state_with(&RewindConfig::default());
        state.close_sessions();
        let mut socket = ScriptedSocket {
            hold_open: true,
            ..ScriptedSocket::default()
        };

        let end = tokio::time::timeout(
            Duration::from_secs(5),
            handle_session(&mut socket, Arc::clone(&state)),
        )
        .await
        .unwrap();

        assert_eq!(end, SessionEnd::ServerShutdown);
        assert!(state.sessions.is_empty().await);
    }
}
