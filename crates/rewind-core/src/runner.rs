//! Fixed-period tick loop.
//!
//! [`run_motion_loop`] drives the [`MotionSimulator`] on a
//! [`tokio::time::interval`], measures the real time since the previous
//! tick, appends each position to the shared history, and hands it to a
//! [`TickCallback`] once the history lock is released. Missed ticks are
//! delayed rather than burst, so a stalled runtime does not produce a run
//! of zero-length ticks.

use std::future::Future;
use std::time::Duration;

use rewind_types::Position;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::history::SharedHistory;
use crate::simulator::MotionSimulator;

/// Callback invoked after each tick's position is stored.
///
/// Implementations broadcast the position, mirror it to durable storage,
/// and so on. They run on the tick task and must not block it.
pub trait TickCallback: Send {
    /// Called with the newly produced position, after the history lock
    /// has been released.
    fn on_tick(&mut self, position: &Position);
}

/// A no-op tick callback for testing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _position: &Position) {}
}

/// Why the tick loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEndReason {
    /// The shutdown future completed.
    Shutdown,
    /// The configured tick limit was reached.
    TickLimit,
}

/// Summary of a finished tick loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopResult {
    /// Why the loop stopped.
    pub end_reason: LoopEndReason,
    /// Ticks executed.
    pub total_ticks: u64,
    /// The last position produced, if any tick ran.
    pub last_position: Option<Position>,
}

/// Run the tick loop until `shutdown` completes or `max_ticks` ticks ran.
///
/// # Arguments
///
/// * `simulator` - Moves the entity and stamps positions
/// * `history` - Shared history the positions are appended to
/// * `period` - Nominal tick period
/// * `max_ticks` - Optional tick limit (`None` runs until shutdown)
/// * `shutdown` - Resolves when the loop should stop
/// * `callback` - Called after each tick
pub async fn run_motion_loop<F>(
    simulator: &mut MotionSimulator,
    history: &SharedHistory,
    period: Duration,
    max_ticks: Option<u64>,
    shutdown: F,
    callback: &mut dyn TickCallback,
) -> LoopResult
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_tick = Instant::now();
    let mut total_ticks: u64 = 0;
    let mut last_position: Option<Position> = None;

    info!(?period, ?max_ticks, "Tick loop starting");

    loop {
        if max_ticks.is_some_and(|limit| total_ticks >= limit) {
            info!(total_ticks, "Tick limit reached");
            return LoopResult {
                end_reason: LoopEndReason::TickLimit,
                total_ticks,
                last_position,
            };
        }

        tokio::select! {
            biased;
            () = &mut shutdown => {
                info!(total_ticks, "Tick loop shutting down");
                return LoopResult {
                    end_reason: LoopEndReason::Shutdown,
                    total_ticks,
                    last_position,
                };
            }
            _ = interval.tick() => {}
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_tick);
        last_tick = now;

        let position = simulator.tick(elapsed);

        // Guard is a temporary, released at the end of the statement.
        let appended = history.write().await.append(position);
        if let Err(e) = appended {
            warn!(error = %e, "Position not stored in history");
        }

        callback.on_tick(&position);

        total_ticks = total_ticks.saturating_add(1);
        last_position = Some(position);
    }
}
