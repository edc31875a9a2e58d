//! API integration tests.
//!
//! These tests drive the router end to end against in-memory stores.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use courier_common::Config;
use courier_db::entities::job::JobStatus;
use courier_queue::{
    JobQueue, ManualClock, MemoryCounterStore, MemoryJobStore, MemorySequenceStore,
    ProcessorRegistry, RateLimiter, SequenceStore, SequenceTracker,
};
use courier_server::{AppState, router};
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &str = "cron-secret";

struct TestApp {
    app: Router,
    queue: JobQueue,
    sequences: Arc<MemorySequenceStore>,
}

fn create_test_config() -> Config {
    Config::from_toml_str(&format!(
        r#"
        [database]
        url = "postgres://localhost/test"

        [cron]
        secret = "{SECRET}"

        [rate_limit.subscribe]
        limit = 2
        window_ms = 60000
        "#
    ))
    .unwrap()
}

fn create_test_app() -> TestApp {
    create_test_app_with(RateLimiter::new(Arc::new(MemoryCounterStore::new())))
}

fn create_test_app_with(limiter: RateLimiter) -> TestApp {
    let config = create_test_config();
    let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
    let sequences = Arc::new(MemorySequenceStore::new());
    let state = AppState::new(
        &config,
        queue.clone(),
        Arc::new(ProcessorRegistry::new()),
        limiter,
        SequenceTracker::new(sequences.clone()),
    )
    .unwrap();

    TestApp {
        app: router(state),
        queue,
        sequences,
    }
}

fn subscribe_request(ip: &str, email: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/subscribe")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(format!(r#"{{"email":"{email}"}}"#)))
        .unwrap()
}

fn cron_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_healthz() {
    let test = create_test_app();

    let response = test
        .app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_subscribe_starts_sequence_and_enqueues_welcome() {
    let test = create_test_app();

    let response = test
        .app
        .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()["x-ratelimit-limit"], "2");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "1");
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let body = json_body(response).await;
    let job_id = body["jobId"].as_str().unwrap();
    let job = test.queue.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.payload["to"], "reader@example.com");
    assert_eq!(job.payload["sequence_id"], body["sequenceId"]);

    let sequence = test
        .sequences
        .find_by_subscriber("reader@example.com", "onboarding")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sequence.current_step, 0);
}

#[tokio::test]
async fn test_repeat_subscribe_does_not_resend_welcome() {
    let test = create_test_app();

    let first = json_body(
        test.app
            .clone()
            .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
            .await
            .unwrap(),
    )
    .await;

    let response = test
        .app
        .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let second = json_body(response).await;

    assert!(first["jobId"].is_string());
    assert!(second["jobId"].is_null());
    assert_eq!(first["sequenceId"], second["sequenceId"]);
    assert_eq!(test.queue.counts().await.unwrap().pending, 1);
}

#[tokio::test]
async fn test_subscribe_is_rate_limited_per_client() {
    let test = create_test_app();

    for _ in 0..2 {
        let response = test
            .app
            .clone()
            .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let response = test
        .app
        .clone()
        .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    let response = test
        .app
        .oneshot(subscribe_request("5.6.7.8", "other@example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_retry_after_follows_limiter_clock() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ));
    let test = create_test_app_with(
        RateLimiter::new(Arc::new(MemoryCounterStore::new())).with_clock(clock.clone()),
    );

    for _ in 0..2 {
        test.app
            .clone()
            .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
            .await
            .unwrap();
    }
    clock.advance(Duration::seconds(15));

    let response = test
        .app
        .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "45");
    assert_eq!(json_body(response).await["error"]["retryAfter"], 45);
}

#[tokio::test]
async fn test_subscribe_rejects_invalid_email() {
    let test = create_test_app();

    let response = test
        .app
        .oneshot(subscribe_request("1.2.3.4", "not-an-email"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test.queue.counts().await.unwrap().pending, 0);
}

#[tokio::test]
async fn test_cron_requires_bearer_token() {
    let test = create_test_app();

    let response = test
        .app
        .clone()
        .oneshot(cron_request("/api/cron/dispatch", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = test
        .app
        .clone()
        .oneshot(cron_request("/api/cron/dispatch", Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = test
        .app
        .oneshot(cron_request("/api/cron/dispatch", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["processed"], 0);
}

#[tokio::test]
async fn test_dispatch_without_processor_records_failure() {
    let test = create_test_app();

    let response = test
        .app
        .clone()
        .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
        .await
        .unwrap();
    let job_id = json_body(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = test
        .app
        .oneshot(cron_request("/api/cron/dispatch", Some(SECRET)))
        .await
        .unwrap();
    let summary = json_body(response).await;
    assert_eq!(summary["processed"], 1);
    assert_eq!(summary["failed"], 1);

    let job = test.queue.get(&job_id).await.unwrap();
    assert_eq!(job.attempts, 1);
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_advance_sequence() {
    let test = create_test_app();

    let response = test
        .app
        .clone()
        .oneshot(subscribe_request("1.2.3.4", "reader@example.com"))
        .await
        .unwrap();
    let sequence_id = json_body(response).await["sequenceId"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/api/sequences/{sequence_id}/advance");
    let response = test
        .app
        .clone()
        .oneshot(cron_request(&uri, Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["current_step"], 1);

    let response = test
        .app
        .oneshot(cron_request("/api/sequences/missing/advance", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
