//! Core data structs shared between the tick loop, resolver, and wire.
//!
//! Two time bases appear throughout:
//!
//! - **local** timestamps are whatever clock the producer owns (Unix
//!   milliseconds for the server, an arbitrary epoch for clients).
//! - **serverTime** is milliseconds since the server process started, the
//!   single shared base every comparison is made in.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Geometry
// =============================================================================

/// A point in the arena.
///
/// Two-dimensional deployments leave `z` at zero, which makes the same
/// Euclidean distance valid for both 2D and 3D clients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinates {
    /// Primary (travel) axis.
    pub x: f64,
    /// Vertical axis in 3D deployments, second planar axis in 2D ones.
    pub y: f64,
    /// Secondary axis; omitted on the wire by 2D clients.
    #[serde(default)]
    pub z: f64,
}

impl Coordinates {
    /// Build a three-component point.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build a planar point (`z = 0`).
    pub const fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx.hypot(dy).hypot(dz)
    }

    /// Whether every component is a finite number.
    pub const fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

// =============================================================================
// Position
// =============================================================================

/// An authoritative sample of the tracked entity.
///
/// Serializes as the body of the `position` broadcast:
/// `{"position": {...}, "timestamp": .., "serverTime": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Where the entity was.
    #[serde(rename = "position")]
    pub coordinates: Coordinates,
    /// Producer's wall clock, Unix milliseconds.
    pub timestamp: i64,
    /// Milliseconds since server start.
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

impl Position {
    /// Create a position sample.
    pub const fn new(coordinates: Coordinates, timestamp: i64, server_time: i64) -> Self {
        Self {
            coordinates,
            timestamp,
            server_time,
        }
    }
}

// =============================================================================
// Clock estimate
// =============================================================================

/// Per-session mapping from client-local time to server time.
///
/// `offset_ms` is added to a client timestamp to express it in serverTime.
/// `one_way_latency_ms` is half the measured round trip. Each half tracks
/// whether it was ever measured so callers can tell a real zero from the
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ClockEstimate {
    /// Signed correction, client local -> serverTime.
    pub offset_ms: i64,
    /// Estimated client-to-server transit delay, never negative.
    pub one_way_latency_ms: i64,
    /// Whether `offset_ms` came from a completed sync.
    pub offset_measured: bool,
    /// Whether `one_way_latency_ms` came from a measurement.
    pub latency_measured: bool,
}

impl ClockEstimate {
    /// Whether any part of the estimate has been measured.
    pub const fn is_measured(&self) -> bool {
        self.offset_measured || self.latency_measured
    }
}

// =============================================================================
// Shot event
// =============================================================================

/// A client's claim that it fired at a point at a local instant.
///
/// This is the payload of the `shoot` message. Impact coordinates arrive
/// flattened (`x`, `y`, optional `z`) as older clients send them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ShotEvent {
    /// Client-local time the shot was fired, milliseconds.
    pub timestamp: i64,
    /// Where the client claims the shot landed.
    #[serde(flatten)]
    pub impact: Coordinates,
    /// Whether the client asks for lag compensation.
    #[serde(default = "default_compensation_enabled")]
    pub compensation_enabled: bool,
    /// Offset the client computed from its own sync exchange, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

const fn default_compensation_enabled() -> bool {
    true
}

// =============================================================================
// Hit result
// =============================================================================

/// Reasons a [`HitResult`] is approximate or was forced to a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// Compensation used a clock estimate that was never measured.
    UnmeasuredClock,
    /// History was empty; the latest published position stood in.
    LatestPositionFallback,
    /// The nearest entry was further from the target time than the window.
    OutsideWindow,
    /// No position of any kind existed to compare against.
    NoHistory,
}

/// Outcome of resolving one shot, sent back as `hit_result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HitResult {
    /// Whether the shot counts as a hit.
    pub hit: bool,
    /// Distance between the rewound position and the claimed impact.
    pub distance: Option<f64>,
    /// `|entry.serverTime - targetTime|` of the matched entry.
    #[serde(rename = "timeDiff")]
    pub time_diff_ms: Option<i64>,
    /// The serverTime the resolver rewound to.
    #[serde(rename = "targetTime")]
    pub target_time: i64,
    /// Compensation window applied, milliseconds.
    #[serde(rename = "window")]
    pub window_ms: i64,
    /// Rewound position of the entity.
    #[serde(rename = "targetPosition")]
    pub target_position: Option<Coordinates>,
    /// Impact point the client claimed.
    #[serde(rename = "impactPosition")]
    pub impact_position: Coordinates,
    /// Approximations that went into this result.
    #[serde(default)]
    pub degraded: Vec<Degradation>,
}

impl HitResult {
    /// Whether the result was computed without any approximation.
    pub fn is_exact(&self) -> bool {
        self.degraded.is_empty()
    }
}
