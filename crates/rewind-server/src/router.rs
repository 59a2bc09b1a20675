//! Axum router construction.
//!
//! Assembles the session `WebSocket` and the status routes into a single
//! [`Router`] with CORS enabled for browser clients served elsewhere.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /ws` -- `WebSocket` session
/// - `GET /api/status` -- server status
/// - `GET /api/history` -- retained positions
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_session))
        .route("/api/status", get(handlers::get_status))
        .route("/api/history", get(handlers::get_history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
