//! REST endpoint handlers for the status API.
//!
//! Both endpoints are read-only views over [`AppState`]. They take the
//! history read lock briefly. `GET /api/history?source=store` reads the
//! durable mirror instead; if no mirror is attached, or it fails or times
//! out, the in-memory history is served and the `x-history-source`
//! response header says so.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/status` | Session count, history fill, latest position |
//! | `GET` | `/api/history` | Retained positions, oldest first |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{AppendHeaders, IntoResponse};
use rewind_types::Position;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Connected sessions.
    pub sessions: usize,
    /// Entries currently in the history.
    pub history_len: usize,
    /// Maximum entries the history keeps.
    pub retention: usize,
    /// Oldest retained server time, if any.
    pub oldest_server_time: Option<i64>,
    /// Most recently published position.
    pub latest_position: Option<Position>,
    /// Current server time.
    pub server_time: i64,
    /// Whether the durable mirror is attached.
    pub store_attached: bool,
}

/// Response header naming where `GET /api/history` read from.
pub const HISTORY_SOURCE_HEADER: &str = "x-history-source";

/// Where history is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    /// The in-memory history.
    #[default]
    Memory,
    /// The durable mirror.
    Store,
}

impl HistorySource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Store => "store",
        }
    }
}

/// Query parameters for `GET /api/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Return only the newest `limit` entries.
    pub limit: Option<usize>,
    /// Read from memory (default) or the durable mirror.
    #[serde(default)]
    pub source: HistorySource,
}

/// `GET /api/status`
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (history_len, retention, oldest_server_time) = {
        let history = state.history.read().await;
        (
            history.len(),
            history.retention(),
            history.oldest().map(|p| p.server_time),
        )
    };

    Json(StatusResponse {
        sessions: state.sessions.len().await,
        history_len,
        retention,
        oldest_server_time,
        latest_position: state.latest_position(),
        server_time: state.clock.now_ms(),
        store_attached: state.store.is_some(),
    })
}

/// `GET /api/history?limit=N&source=memory|store`
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.limit == Some(0) {
        return Err(ApiError::InvalidQuery("limit must be at least 1".to_owned()));
    }

    let (source, mut positions) = read_history(&state, query.source).await;
    if let Some(limit) = query.limit {
        let skip = positions.len().saturating_sub(limit);
        positions.drain(..skip);
    }
    Ok((
        AppendHeaders([(HISTORY_SOURCE_HEADER, source.as_str())]),
        Json(positions),
    ))
}

async fn read_history(state: &AppState, wanted: HistorySource) -> (HistorySource, Vec<Position>) {
    if wanted == HistorySource::Store {
        if let Some(store) = &state.store {
            match store.fetch_all_within(state.store_timeout).await {
                Ok(positions) => return (HistorySource::Store, positions),
                Err(e) => warn!(error = %e, "Mirror read failed, serving in-memory history"),
            }
        }
    }
    (HistorySource::Memory, state.history.read().await.snapshot())
}
