//! Shared application state for the session server.
//!
//! [`AppState`] holds every service a session task needs: the server
//! clock, the shared position history, the session registry, the hit
//! resolver, the broadcast channel for positions, and the optional durable
//! mirror. It is built once by the engine and handed to Axum wrapped in an
//! [`Arc`].

use std::sync::Arc;
use std::time::Duration;

use rewind_core::clock::ServerClock;
use rewind_core::config::{RewindConfig, SyncMode};
use rewind_core::history::SharedHistory;
use rewind_core::resolver::HitResolver;
use rewind_core::session::SessionRegistry;
use rewind_db::HistoryStream;
use rewind_types::Position;
use tokio::sync::{broadcast, watch};

/// Capacity of the broadcast channel for positions.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BROADCAST_CAPACITY: usize = 256;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
pub struct AppState {
    /// Broadcast sender for per-tick positions.
    pub tx: broadcast::Sender<Position>,
    /// The single time base every `serverTime` is read from.
    pub clock: ServerClock,
    /// Position history written by the tick loop.
    pub history: SharedHistory,
    /// Clock estimates of connected sessions.
    pub sessions: Arc<SessionRegistry>,
    /// Shot evaluation.
    pub resolver: HitResolver,
    /// Clock exchange variant answered on `sync`.
    pub sync_mode: SyncMode,
    /// Upper bound on one socket write.
    pub write_timeout: Duration,
    /// Durable mirror of the history, when one is attached.
    pub store: Option<HistoryStream>,
    /// Upper bound on one store call.
    pub store_timeout: Duration,
    latest: watch::Sender<Option<Position>>,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Create the state from configuration, sharing `clock` and `history`
    /// with the tick loop.
    pub fn new(config: &RewindConfig, clock: ServerClock, history: SharedHistory) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (latest, _) = watch::channel(None);
        let (shutdown, _) = watch::channel(false);
        Self {
            tx,
            clock,
            history,
            sessions: Arc::new(SessionRegistry::new()),
            resolver: HitResolver::new(config.resolver.clone()),
            sync_mode: config.sync.mode,
            write_timeout: config.server.write_timeout(),
            store: None,
            store_timeout: config.store.timeout(),
            latest,
            shutdown,
        }
    }

    /// Attach a durable mirror.
    #[must_use]
    pub fn with_store(mut self, store: HistoryStream) -> Self {
        self.store = Some(store);
        self
    }

    /// Subscribe to the position broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Position> {
        self.tx.subscribe()
    }

    /// Record `position` as the most recent one and send it to every
    /// connected session.
    ///
    /// Returns the number of receivers that received the message.
    /// Returns 0 if no clients are connected (this is not an error).
    pub fn publish(&self, position: &Position) -> usize {
        self.latest.send_replace(Some(*position));
        // send returns Err only when there are zero receivers,
        // which is normal when no WebSocket clients are connected.
        self.tx.send(*position).unwrap_or(0)
    }

    /// The most recently published position, independent of the history.
    pub fn latest_position(&self) -> Option<Position> {
        *self.latest.borrow()
    }

    /// Ask every open session to finish. Sessions opened afterwards end
    /// immediately.
    pub fn close_sessions(&self) {
        self.shutdown.send_replace(true);
    }

    /// Receiver that turns `true` once [`close_sessions`](Self::close_sessions)
    /// has been called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
