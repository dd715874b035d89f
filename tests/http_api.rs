//! HTTP API tests driven through the router without binding a socket

mod fixtures;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use fixtures::seeded_store;
use serde_json::{json, Value};
use song_battle::config::AppConfig;
use song_battle::service::{router, AppState};
use song_battle::storage::BattleStore;
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(items: &[(i32, u32)]) -> (Router, Arc<AppState>) {
    let mut config = AppConfig::default();
    config.matchmaking.seed = Some(99);

    let state = Arc::new(AppState::with_store(config, seeded_store(items)).unwrap());
    state.start();
    (router(state.clone()), state)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_next_match_needs_two_items() {
    let (app, _) = app_with(&[(1200, 0)]);

    let (status, body) = get(&app, "/match/next").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_data");
}

#[tokio::test]
async fn test_next_match_returns_distinct_pair() {
    let (app, _) = app_with(&[(1200, 0), (1200, 0), (1300, 8)]);

    let (status, body) = get(&app, "/match/next").await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["left"]["item"]["id"], body["right"]["item"]["id"]);
    assert!(body["mode"].is_string());
    assert!(body["quality"].is_string());
}

#[tokio::test]
async fn test_duel_updates_ratings() {
    let (app, state) = app_with(&[(1200, 0), (1200, 0)]);

    let (status, body) = post(&app, "/duel", json!({"left_id": 1, "right_id": 2, "outcome": "left"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["left"]["new_rating"], 1216);
    assert_eq!(body["right"]["new_rating"], 1184);
    assert_eq!(body["record"]["winner_item_id"], 1);

    assert_eq!(state.store().match_count().unwrap(), 1);
}

#[tokio::test]
async fn test_preview_does_not_write() {
    let (app, state) = app_with(&[(1400, 12), (1200, 5)]);

    let (status, body) = post(&app, "/duel/preview", json!({"left_id": 1, "right_id": 2, "outcome": "left"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["left"]["new_rating"], 1406);
    assert_eq!(body["right"]["new_rating"], 1192);

    assert_eq!(state.store().match_count().unwrap(), 0);
    assert_eq!(state.store().get_rating(1).unwrap().unwrap().rating, 1400);
}

#[tokio::test]
async fn test_invalid_outcome_is_unprocessable() {
    let (app, state) = app_with(&[(1200, 0), (1200, 0)]);

    let (status, body) = post(&app, "/duel", json!({"left_id": 1, "right_id": 2, "outcome": "both"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_outcome");
    assert_eq!(state.store().match_count().unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let (app, state) = app_with(&[(1200, 0), (1200, 0)]);

    let (status, body) = post(&app, "/duel", json!({"left_id": 1, "right_id": 77, "outcome": "draw"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(state.store().match_count().unwrap(), 0);
}

#[tokio::test]
async fn test_ranking_is_ordered_and_limited() {
    let (app, _) = app_with(&[(1200, 0), (1350, 6), (1350, 9), (1100, 2)]);

    let (status, body) = get(&app, "/ranking?limit=3").await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["item"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 3, 1]);
}

#[tokio::test]
async fn test_history_and_stats_follow_duels() {
    let (app, _) = app_with(&[(1200, 0), (1200, 0), (1200, 0)]);

    post(&app, "/duel", json!({"left_id": 1, "right_id": 2, "outcome": "skip"})).await;
    post(&app, "/duel", json!({"left_id": 3, "right_id": 1, "outcome": "right"})).await;

    let (status, history) = get(&app, "/history?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["left_item_id"], 3);
    assert_eq!(history[0]["winner_item_id"], 1);

    let (status, stats) = get(&app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["ratings"]["total_items"], 3);
    assert_eq!(stats["ratings"]["total_matches"], 2);
    assert_eq!(stats["matchmaking"]["underplayed_items"], 3);
}

#[tokio::test]
async fn test_health_reports_store_and_pool() {
    let (app, state) = app_with(&[(1200, 0), (1200, 0)]);

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    let names: Vec<&str> = body["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|check| check["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"battle_store"));

    state.shutdown();
    let (status, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_liveness_ignores_pool_size() {
    // A single item degrades /health but the service is still live
    let (app, state) = app_with(&[(1200, 0)]);

    let (status, body) = get(&app, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    state.shutdown();
    let (status, body) = get(&app, "/health/live").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_endpoint_counts_duels() {
    let (app, _) = app_with(&[(1200, 0), (1200, 0)]);
    post(&app, "/duel", json!({"left_id": 1, "right_id": 2, "outcome": "draw"})).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("song_battle_duels_processed_total"));
    assert!(text.contains("outcome=\"draw\""));
}
