//! Session `WebSocket` and status API for the Rewind server.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) carrying one client session: clock
//!   sync, shot resolution, latency reports, and the per-tick position
//!   stream fanned out through [`tokio::sync::broadcast`]
//! - **REST endpoints** (`/api/status`, `/api/history`) for read-only
//!   inspection of the server
//!
//! # Architecture
//!
//! Each `WebSocket` connection runs as its own task for as long as the
//! socket stays open. Everything the tasks share (history, session
//! registry, broadcast sender) lives in [`AppState`]; locks are held only
//! around in-memory work and never across a socket write.

pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerError, bind, serve};
pub use state::AppState;
