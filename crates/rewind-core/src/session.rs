//! Per-session clock estimates.
//!
//! The [`SessionRegistry`] is the only place a session's clock offset and
//! latency live. It is shared between every session task, so all access
//! goes through an async lock held only for the map operation itself.
//!
//! Entries are created on connect with an unmeasured default estimate and
//! removed on disconnect. Offset and latency are independent and both
//! last-write-wins.

use std::collections::BTreeMap;

use rewind_types::{ClockEstimate, SessionId};
use tokio::sync::RwLock;
use tracing::debug;

/// Shared map of connected sessions to their clock estimates.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<SessionId, ClockEstimate>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Register a new session with a default estimate and return its id.
    pub async fn connect(&self) -> SessionId {
        let id = SessionId::new();
        self.connect_with(id).await;
        id
    }

    /// Register `id` with a default estimate, replacing anything stale.
    pub async fn connect_with(&self, id: SessionId) {
        self.sessions
            .write()
            .await
            .insert(id, ClockEstimate::default());
        debug!(session = %id, "Session registered");
    }

    /// Remove a session entirely. Returns whether it was registered.
    pub async fn disconnect(&self, id: SessionId) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        debug!(session = %id, removed, "Session unregistered");
        removed
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Replace the session's offset. Returns `false` for unknown sessions.
    pub async fn update_offset(&self, id: SessionId, offset_ms: i64) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&id).is_some_and(|estimate| {
            estimate.offset_ms = offset_ms;
            estimate.offset_measured = true;
            true
        })
    }

    /// Replace the session's one-way latency (clamped to zero).
    /// Returns `false` for unknown sessions.
    pub async fn update_latency(&self, id: SessionId, one_way_latency_ms: i64) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&id).is_some_and(|estimate| {
            estimate.one_way_latency_ms = one_way_latency_ms.max(0);
            estimate.latency_measured = true;
            true
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Current estimate, or `None` if the session is not registered.
    ///
    /// A registered but never-synced session returns the default estimate;
    /// check [`ClockEstimate::is_measured`] before trusting it.
    pub async fn lookup(&self, id: SessionId) -> Option<ClockEstimate> {
        self.sessions.read().await.get(&id).copied()
    }

    /// Estimate for `id`, falling back to the unmeasured default.
    pub async fn estimate_or_default(&self, id: SessionId) -> ClockEstimate {
        self.lookup(id).await.unwrap_or_default()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
