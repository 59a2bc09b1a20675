//! Integration tests for the status API and routing.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rewind_core::clock::ServerClock;
use rewind_core::config::RewindConfig;
use rewind_core::history::PositionHistory;
use rewind_server::handlers::{HISTORY_SOURCE_HEADER, StatusResponse};
use rewind_server::{AppState, build_router};
use rewind_types::{Coordinates, Position};
use serde_json::Value;
use tower::ServiceExt;

async fn make_test_state(ticks: i64) -> Arc<AppState> {
    let mut config = RewindConfig::default();
    config.history.retention = 4;
    let history = PositionHistory::shared(config.history.retention).unwrap();
    let state = AppState::new(&config, ServerClock::start(), Arc::clone(&history));

    for i in 0..ticks {
        #[allow(clippy::cast_precision_loss)]
        let x = i as f64;
        let pos = Position::new(Coordinates::new(x, 1.0, 0.0), 0, i * 25);
        history.write().await.append(pos).unwrap();
        state.publish(&pos);
    }
    Arc::new(state)
}

async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let app = build_router(state);
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Extractor rejections answer in plain text.
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn status_reports_history_and_sessions() {
    let state = make_test_state(6).await;
    state.sessions.connect().await;

    let (status, json) = get_json(Arc::clone(&state), "/api/status").await;
    assert_eq!(status, StatusCode::OK);

    let body: StatusResponse = serde_json::from_value(json).unwrap();
    assert_eq!(body.sessions, 1);
    assert_eq!(body.history_len, 4);
    assert_eq!(body.retention, 4);
    assert_eq!(body.oldest_server_time, Some(50));
    assert_eq!(body.latest_position.unwrap().server_time, 125);
    assert!(!body.store_attached);
    assert!(body.server_time >= 0);
}

#[tokio::test]
async fn status_on_a_fresh_server() {
    let (status, json) = get_json(make_test_state(0).await, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["historyLen"], 0);
    assert!(json["latestPosition"].is_null());
    assert!(json["oldestServerTime"].is_null());
}

#[tokio::test]
async fn history_is_oldest_first() {
    let (status, json) = get_json(make_test_state(6).await, "/api/history").await;
    assert_eq!(status, StatusCode::OK);

    let times: Vec<i64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["serverTime"].as_i64().unwrap())
        .collect();
    assert_eq!(times, vec![50, 75, 100, 125]);
    assert_eq!(json[0]["position"]["x"], 2.0);
}

#[tokio::test]
async fn history_limit_keeps_the_newest() {
    let (status, json) = get_json(make_test_state(6).await, "/api/history?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["serverTime"], 100);
    assert_eq!(arr[1]["serverTime"], 125);
}

#[tokio::test]
async fn history_limit_zero_is_rejected() {
    let (status, json) = get_json(make_test_state(1).await, "/api/history?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn ws_requires_an_upgrade() {
    let app = build_router(make_test_state(0).await);
    let response = app
        .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = build_router(make_test_state(0).await);
    let response = app
        .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_reads_fall_back_to_memory_without_a_mirror() {
    let app = build_router(make_test_state(3).await);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/history?source=store")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[HISTORY_SOURCE_HEADER].to_str().unwrap(),
        "memory"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unknown_history_source_is_rejected() {
    let (status, _) = get_json(make_test_state(1).await, "/api/history?source=disk").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
