//! Per-message handling for a session.
//!
//! [`dispatch`] turns one parsed [`ClientMessage`] into at most one reply.
//! It never touches the socket, so the session task stays the only owner
//! of its connection and these handlers can be exercised directly.
//!
//! `received_at` is the server time at which the frame arrived. It is the
//! sync receive time (t1) and the receive time an uncompensated shot is
//! judged at.

use rewind_core::clock::{latency_from_rtt, two_timestamp_offset};
use rewind_core::config::SyncMode;
use rewind_types::{
    ClientMessage, ErrorNotice, HitResult, ServerMessage, SessionId, ShotEvent, SyncRequest,
    SyncResponse,
};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Decode one text frame.
///
/// # Errors
///
/// Returns the `error` reply to send back when the frame is not a known
/// client message.
pub fn parse_frame(text: &str) -> Result<ClientMessage, ServerMessage> {
    serde_json::from_str(text).map_err(|e| error_reply(format!("malformed message: {e}")))
}

/// Handle one client message and produce the reply, if any.
pub async fn dispatch(
    state: &AppState,
    session: SessionId,
    message: ClientMessage,
    received_at: i64,
) -> Option<ServerMessage> {
    match message {
        ClientMessage::Sync(request) => Some(handle_sync(state, session, request, received_at).await),
        ClientMessage::Shoot(shot) => Some(handle_shoot(state, session, &shot, received_at).await),
        ClientMessage::LatencyUpdate(update) => {
            let latency = latency_from_rtt(update.rtt);
            state.sessions.update_latency(session, latency).await;
            debug!(%session, rtt = update.rtt, latency, "Latency updated");
            None
        }
        ClientMessage::Ping => Some(ServerMessage::Pong),
    }
}

async fn handle_sync(
    state: &AppState,
    session: SessionId,
    request: SyncRequest,
    received_at: i64,
) -> ServerMessage {
    let t0 = request.client_time;
    match state.sync_mode {
        SyncMode::FourTimestamp => {
            let sent_at = state.clock.now_ms().max(received_at);
            ServerMessage::SyncResponse(SyncResponse::exchange(t0, received_at, sent_at))
        }
        SyncMode::TwoTimestamp => {
            let offset = two_timestamp_offset(received_at, t0);
            state.sessions.update_offset(session, offset).await;
            debug!(%session, offset, "Offset updated from two-timestamp sync");
            ServerMessage::SyncResponse(SyncResponse::single(t0, received_at))
        }
    }
}

async fn handle_shoot(
    state: &AppState,
    session: SessionId,
    shot: &ShotEvent,
    received_at: i64,
) -> ServerMessage {
    if !shot.impact.is_finite() {
        return error_reply("impact coordinates must be finite numbers");
    }

    // Opted-out shots carry a placeholder offset.
    if let Some(offset) = shot.offset.filter(|_| shot.compensation_enabled) {
        state.sessions.update_offset(session, offset).await;
    }

    let estimate = state.sessions.estimate_or_default(session).await;
    if shot.compensation_enabled && !estimate.is_measured() {
        warn!(
            %session,
            offset_measured = estimate.offset_measured,
            latency_measured = estimate.latency_measured,
            "Compensating with an unmeasured clock estimate"
        );
    }

    let fallback = state.latest_position();
    let result = {
        let history = state.history.read().await;
        state
            .resolver
            .resolve(&history, &estimate, shot, received_at, fallback.as_ref())
    };

    log_result(session, shot, &result);
    ServerMessage::HitResult(result)
}

fn log_result(session: SessionId, shot: &ShotEvent, result: &HitResult) {
    info!(
        %session,
        hit = result.hit,
        compensated = shot.compensation_enabled,
        target_time = result.target_time,
        time_diff = ?result.time_diff_ms,
        distance = ?result.distance,
        degraded = ?result.degraded,
        "Shot resolved"
    );
}

/// Build an `error` reply.
pub fn error_reply(message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error(ErrorNotice {
        message: message.into(),
    })
}
