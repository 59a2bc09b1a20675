//! `WebSocket` message envelopes.
//!
//! Every frame is a JSON object tagged with a `type` field:
//!
//! | Direction | `type` | Payload |
//! |-----------|--------|---------|
//! | client -> server | `sync` | [`SyncRequest`] |
//! | client -> server | `shoot` | [`ShotEvent`] |
//! | client -> server | `latency_update` | [`LatencyUpdate`] |
//! | client -> server | `ping` | none |
//! | server -> client | `sync_response` | [`SyncResponse`] |
//! | server -> client | `hit_result` | [`HitResult`] |
//! | server -> client | `position` | [`Position`] |
//! | server -> client | `pong` | none |
//! | server -> client | `error` | [`ErrorNotice`] |

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::structs::{HitResult, Position, ShotEvent};

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin a clock exchange.
    Sync(SyncRequest),
    /// Ask for a hit resolution.
    Shoot(ShotEvent),
    /// Report an independently measured round trip.
    LatencyUpdate(LatencyUpdate),
    /// Liveness probe.
    Ping,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Answer to a [`ClientMessage::Sync`].
    SyncResponse(SyncResponse),
    /// Answer to a [`ClientMessage::Shoot`].
    HitResult(HitResult),
    /// Per-tick broadcast of the entity.
    Position(Position),
    /// Answer to a [`ClientMessage::Ping`].
    Pong,
    /// A client frame could not be understood.
    Error(ErrorNotice),
}

/// Payload of `sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyncRequest {
    /// Client-local send time (t0).
    #[serde(rename = "clientTime", alias = "timestamp")]
    pub client_time: i64,
}

/// Payload of `sync_response`.
///
/// The four-timestamp exchange fills `server_recv_time` and
/// `server_send_time`; the degraded two-timestamp exchange fills only
/// `server_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyncResponse {
    /// Echo of the client's t0.
    #[serde(rename = "clientTime")]
    pub client_time: i64,
    /// Server receive time (t1).
    #[serde(rename = "serverRecvTime", default, skip_serializing_if = "Option::is_none")]
    pub server_recv_time: Option<i64>,
    /// Server send time (t2).
    #[serde(rename = "serverSendTime", default, skip_serializing_if = "Option::is_none")]
    pub server_send_time: Option<i64>,
    /// Single server timestamp of the degraded exchange.
    #[serde(rename = "serverTime", default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
}

impl SyncResponse {
    /// Response for the four-timestamp exchange.
    pub const fn exchange(client_time: i64, server_recv_time: i64, server_send_time: i64) -> Self {
        Self {
            client_time,
            server_recv_time: Some(server_recv_time),
            server_send_time: Some(server_send_time),
            server_time: None,
        }
    }

    /// Response for the degraded two-timestamp exchange.
    pub const fn single(client_time: i64, server_time: i64) -> Self {
        Self {
            client_time,
            server_recv_time: None,
            server_send_time: None,
            server_time: Some(server_time),
        }
    }
}

/// Payload of `latency_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LatencyUpdate {
    /// Measured round-trip time, milliseconds.
    pub rtt: i64,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ErrorNotice {
    /// Human-readable reason.
    pub message: String,
}
