//! Server time base and client clock estimation.
//!
//! The server's time base is milliseconds since process start, measured
//! on a monotonic clock so it never runs backwards. Clients carry their own
//! clocks with an unknown epoch; the timestamp exchange here estimates the
//! offset that maps a client reading into server time, and the one-way
//! latency between them.
//!
//! # Four-timestamp exchange
//!
//! ```text
//! client                server
//!   t0 ---- sync ---->    t1 (receive)
//!   t3 <--- reply ----    t2 (send)
//!
//! rtt     = t3 - t0
//! latency = rtt / 2
//! offset  = t1 - (t0 + latency)
//! ```
//!
//! All arithmetic saturates; a hostile timestamp yields a clamped estimate,
//! never an overflow.

use std::time::Instant;

use chrono::Utc;
use rewind_types::ClockEstimate;

/// Monotonic server time base.
#[derive(Debug, Clone, Copy)]
pub struct ServerClock {
    started: Instant,
}

impl ServerClock {
    /// Start the time base now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Milliseconds since start (serverTime).
    pub fn now_ms(&self) -> i64 {
        let elapsed = self.started.elapsed().as_millis();
        i64::try_from(elapsed).unwrap_or(i64::MAX)
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::start()
    }
}

/// Wall-clock time as Unix milliseconds, the local timestamp the server
/// stamps on the positions it produces.
pub fn wall_clock_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The four timestamps of one completed sync exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncExchange {
    /// Client send time, client clock.
    pub client_send: i64,
    /// Server receive time, server clock.
    pub server_recv: i64,
    /// Server send time, server clock.
    pub server_send: i64,
    /// Client receive time, client clock.
    pub client_recv: i64,
}

impl SyncExchange {
    /// Round-trip time as seen by the client, never negative.
    pub const fn round_trip_ms(&self) -> i64 {
        let rtt = self.client_recv.saturating_sub(self.client_send);
        if rtt < 0 { 0 } else { rtt }
    }

    /// One-way latency, half the round trip (rounded down).
    pub const fn one_way_latency_ms(&self) -> i64 {
        latency_from_rtt(self.round_trip_ms())
    }

    /// Offset mapping client time to server time: `t1 - (t0 + latency)`.
    pub const fn offset_ms(&self) -> i64 {
        let sent_arrival = self.client_send.saturating_add(self.one_way_latency_ms());
        self.server_recv.saturating_sub(sent_arrival)
    }

    /// Time the server spent between receiving and replying, never negative.
    pub const fn server_processing_ms(&self) -> i64 {
        let held = self.server_send.saturating_sub(self.server_recv);
        if held < 0 { 0 } else { held }
    }

    /// Full measured estimate from this exchange.
    pub const fn estimate(&self) -> ClockEstimate {
        ClockEstimate {
            offset_ms: self.offset_ms(),
            one_way_latency_ms: self.one_way_latency_ms(),
            offset_measured: true,
            latency_measured: true,
        }
    }
}

/// Degraded two-timestamp offset: `server_now - client_time`.
///
/// Folds network and processing delay into the offset, so it is only as
/// good as the path is short and symmetric.
pub const fn two_timestamp_offset(server_now: i64, client_time: i64) -> i64 {
    server_now.saturating_sub(client_time)
}

/// One-way latency from an out-of-band round-trip report.
pub const fn latency_from_rtt(rtt_ms: i64) -> i64 {
    if rtt_ms <= 0 { 0 } else { rtt_ms / 2 }
}

/// Map a client-local instant into server time using `estimate`.
pub const fn to_server_time(client_time: i64, estimate: &ClockEstimate) -> i64 {
    client_time.saturating_add(estimate.offset_ms)
}
