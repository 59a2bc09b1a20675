//! Shared type definitions for the Rewind lag-compensation server.
//!
//! This crate is the single source of truth for all types that cross a
//! crate or network boundary. Wire types flow downstream to `TypeScript`
//! via `ts-rs` so browser clients can share the message schema.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for session identities
//! - [`structs`] -- Positions, clock estimates, shot events, hit results
//! - [`messages`] -- Tagged `WebSocket` messages in both directions

pub mod ids;
pub mod messages;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use ids::SessionId;
pub use messages::{
    ClientMessage, ErrorNotice, LatencyUpdate, ServerMessage, SyncRequest, SyncResponse,
};
pub use structs::{ClockEstimate, Coordinates, Degradation, HitResult, Position, ShotEvent};
