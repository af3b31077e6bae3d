//! HTTP surface tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use banlist_common::db::init_memory_database;
use banlist_common::EventBus;
use banlist_ingest::db::servers;
use banlist_ingest::services::{Dispatcher, DispatcherConfig};
use banlist_ingest::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tower::util::ServiceExt;

/// Test helper: app state with a running dispatcher over an in-memory database
async fn create_test_state() -> AppState {
    let pool = init_memory_database().await.unwrap();
    servers::register_server(&pool, "s1", None).await.unwrap();

    let bus = EventBus::new(64);
    let config = DispatcherConfig {
        item_delay: Duration::ZERO,
        digest_interval: None,
        ..DispatcherConfig::default()
    };
    let (dispatcher, handle) = Dispatcher::new(pool.clone(), bus.clone(), config);
    tokio::spawn(dispatcher.run());

    AppState::new(pool, bus, handle)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(create_test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "banlist-ingest");
    assert_eq!(json["event_subscribers"], 0);
}

#[tokio::test]
async fn test_enqueue_scraper_observation() {
    let state = create_test_state().await;
    let app = build_router(state.clone());

    let response = app
        .oneshot(post_json(
            "/queue/users",
            json!({"guildId": "s1", "id": "u1", "type": "CHEATER", "roles": ["Admin"]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["queue"], "users");

    // Processed in arrival order, so a waited submit proves the first landed
    let outcome = state
        .dispatcher
        .submit_and_wait(
            banlist_common::Feed::Scraper,
            serde_json::from_value(json!({"guildId": "s1", "id": "u1", "type": "OTHER"})).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, banlist_ingest::services::ObservationOutcome::Updated);
}

#[tokio::test]
async fn test_enqueue_accepts_message_without_id() {
    let app = build_router(create_test_state().await);

    let response = app
        .oneshot(post_json("/queue/usersChat", json!({"guildId": "s1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_unknown_queue_is_not_found() {
    let app = build_router(create_test_state().await);

    let response = app
        .oneshot(post_json("/queue/bulk", json!({"guildId": "s1"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_closed_dispatcher_is_unavailable() {
    let pool = init_memory_database().await.unwrap();
    let bus = EventBus::new(4);
    let (dispatcher, handle) = Dispatcher::new(pool.clone(), bus.clone(), DispatcherConfig::default());
    drop(dispatcher);
    let app = build_router(AppState::new(pool, bus, handle));

    let response = app
        .oneshot(post_json("/queue/users", json!({"guildId": "s1", "id": "u1", "type": "OTHER"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_batch_run_without_directory_is_bad_request() {
    let app = build_router(create_test_state().await);

    let response = app
        .oneshot(Request::builder().method("POST").uri("/batch/run").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_run_starts_and_rejects_overlap() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scan-s1.json"), r#"[{"id":"u1","type":"LEAKER"}]"#).unwrap();

    let state = create_test_state().await.with_batch_dir(Some(dir.path().to_path_buf()));
    let mut events = state.event_bus.subscribe();

    // Hold the running flag to simulate an in-progress run
    state.batch_running.store(true, std::sync::atomic::Ordering::SeqCst);
    let response = build_router(state.clone())
        .oneshot(post_json("/batch/run", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    state.batch_running.store(false, std::sync::atomic::Ordering::SeqCst);

    let response = build_router(state.clone())
        .oneshot(post_json("/batch/run", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let summary = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if event.event_type() == "BatchRunSummary" => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        summary,
        banlist_common::BlacklistEvent::BatchRunSummary { file_count: 1, total_new: 1, .. }
    ));
}
