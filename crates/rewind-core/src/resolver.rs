//! Rewind and hit/miss evaluation.
//!
//! A shot is judged against where the target was when the shooter saw it,
//! not where it is when the shot arrives. With compensation enabled the
//! resolver maps the client's shot time into server time with the
//! session's offset, rewinds a further one-way latency, and looks up the
//! nearest history entry to that instant. With compensation disabled it
//! judges against the history entry nearest to the server receive time.
//!
//! The compensation window bounds how far the matched entry may sit from
//! the target time. With `enforce_window` on, a match outside the window is
//! a miss, which stops a client from fishing through the whole retained
//! history with a forged timestamp.
//!
//! Resolution is a pure function of its inputs: the same shot against the
//! same history always yields the same [`HitResult`].

use rewind_types::{ClockEstimate, Degradation, HitResult, Position, ShotEvent};

use crate::clock::to_server_time;
use crate::config::ResolverConfig;
use crate::history::PositionHistory;

/// Stateless hit resolver parameterized by [`ResolverConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct HitResolver {
    config: ResolverConfig,
}

impl HitResolver {
    /// Create a resolver.
    pub const fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Compensation window for a shot, milliseconds.
    pub const fn window_ms(&self, compensation_enabled: bool) -> i64 {
        if compensation_enabled {
            self.config.compensated_window_ms
        } else {
            self.config.uncompensated_window_ms
        }
    }

    /// Server time to rewind to.
    ///
    /// Compensated: `shot.timestamp + offset - one_way_latency`.
    /// Uncompensated: `server_receive_time`.
    pub const fn target_time(
        shot: &ShotEvent,
        estimate: &ClockEstimate,
        server_receive_time: i64,
    ) -> i64 {
        if shot.compensation_enabled {
            to_server_time(shot.timestamp, estimate).saturating_sub(estimate.one_way_latency_ms)
        } else {
            server_receive_time
        }
    }

    /// Resolve one shot.
    ///
    /// `fallback` is the most recent position published outside the
    /// history; it is used (and flagged) only when the history is empty.
    pub fn resolve(
        &self,
        history: &PositionHistory,
        estimate: &ClockEstimate,
        shot: &ShotEvent,
        server_receive_time: i64,
        fallback: Option<&Position>,
    ) -> HitResult {
        let window_ms = self.window_ms(shot.compensation_enabled);
        let target_time = Self::target_time(shot, estimate, server_receive_time);
        let mut degraded = Vec::new();

        if shot.compensation_enabled && !estimate.is_measured() {
            degraded.push(Degradation::UnmeasuredClock);
        }

        let matched = history.nearest_to(target_time).map_or_else(
            || {
                fallback.map(|p| {
                    degraded.push(Degradation::LatestPositionFallback);
                    let diff = p.server_time.abs_diff(target_time);
                    (*p, i64::try_from(diff).unwrap_or(i64::MAX))
                })
            },
            |m| Some((m.position, m.time_diff_ms)),
        );

        let Some((position, time_diff_ms)) = matched else {
            degraded.push(Degradation::NoHistory);
            return HitResult {
                hit: false,
                distance: None,
                time_diff_ms: None,
                target_time,
                window_ms,
                target_position: None,
                impact_position: shot.impact,
                degraded,
            };
        };

        let distance = position.coordinates.distance(&shot.impact);
        let within_window = time_diff_ms <= window_ms;
        if !within_window {
            degraded.push(Degradation::OutsideWindow);
        }
        let time_valid = within_window || !self.config.enforce_window;
        let hit = time_valid && distance < self.config.hit_radius;

        HitResult {
            hit,
            distance: Some(distance),
            time_diff_ms: Some(time_diff_ms),
            target_time,
            window_ms,
            target_position: Some(position.coordinates),
            impact_position: shot.impact,
            degraded,
        }
    }
}
