//! Tick callback that hands each position to the sessions and the mirror.
//!
//! The position goes out on the broadcast channel first. When a durable
//! mirror is attached, the write is spawned onto its own task with the
//! store timeout, so a slow or absent store never delays the next tick.

use std::sync::Arc;

use rewind_core::runner::TickCallback;
use rewind_server::AppState;
use rewind_types::Position;
use tracing::{trace, warn};

/// Callback that bridges the tick loop to connected sessions.
pub struct PublishCallback {
    state: Arc<AppState>,
}

impl PublishCallback {
    /// Create a callback backed by the given app state.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl TickCallback for PublishCallback {
    fn on_tick(&mut self, position: &Position) {
        let receivers = self.state.publish(position);
        trace!(server_time = position.server_time, receivers, "Position broadcast sent");

        if let Some(store) = &self.state.store {
            let store = store.clone();
            let position = *position;
            let timeout = self.state.store_timeout;
            tokio::spawn(async move {
                if let Err(e) = store.append_within(&position, timeout).await {
                    warn!(
                        error = %e,
                        server_time = position.server_time,
                        "Position not mirrored"
                    );
                }
            });
        }
    }
}
