//! Durable mirror of the position history (`Dragonfly` / Redis).
//!
//! The in-process history is authoritative; this crate only keeps a
//! best-effort copy in a sorted set so other tools can read the recent
//! track of the target. Nothing in the hit path waits on it.
//!
//! # Modules
//!
//! - [`dragonfly`] -- Sorted-set history stream operations
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;

// Re-export primary types for convenience.
pub use dragonfly::HistoryStream;
pub use error::DbError;
