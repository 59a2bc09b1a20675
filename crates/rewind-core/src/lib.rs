//! Clock synchronization, position history, and rewind hit resolution.
//!
//! This crate owns everything that needs algorithmic care: mapping client
//! clocks into server time, keeping a bounded time-ordered history of the
//! tracked entity, and answering "where was it when the client fired".
//!
//! # Modules
//!
//! - [`clock`] -- Server time base and the timestamp-exchange estimator.
//! - [`config`] -- Configuration loading from `rewind-config.yaml` into
//!   strongly-typed structs.
//! - [`history`] -- Bounded, time-ordered position history with
//!   nearest-time lookup.
//! - [`resolver`] -- Rewind and hit/miss evaluation for shot events.
//! - [`runner`] -- The fixed-period tick loop and its [`TickCallback`].
//! - [`session`] -- Per-session clock estimates keyed by [`SessionId`].
//! - [`simulator`] -- Motion of the tracked entity inside the arena.
//!
//! [`TickCallback`]: runner::TickCallback
//! [`SessionId`]: rewind_types::SessionId

pub mod clock;
pub mod config;
pub mod history;
pub mod resolver;
pub mod runner;
pub mod session;
pub mod simulator;
