//! Admission control under load.
//!
//! The mock enricher is held so jobs pile up in the queue; releasing it lets
//! the pool drain and admissions resume.

use axum::http::StatusCode;
use integration_tests::{
    fixtures,
    setup::{wait_until, TestContext, TestOptions},
};
use serde_json::Value;
use std::time::Duration;

fn small_pool(threshold: f64) -> TestContext {
    TestContext::with_options(TestOptions {
        worker_count: 1,
        job_queue_size: 10,
        backpressure_threshold: threshold,
        ..TestOptions::default()
    })
}

/// Saturated queue returns 429 with Retry-After, then recovers.
#[tokio::test]
async fn test_backpressure_rejects_then_recovers() {
    let ctx = small_pool(0.90);
    ctx.enricher.hold();
    let server = ctx.server();

    server
        .post("/api/v1/logs")
        .content_type("application/json")
        .bytes(fixtures::array_payload(fixtures::log_entries(10, "tenant-load")).into())
        .await
        .assert_status(StatusCode::ACCEPTED);

    // One job is parked in the held worker, the rest sit in the queue
    assert!(ctx.pool.queue_utilization() >= 0.9);

    let response = server
        .post("/api/v1/logs")
        .content_type("application/json")
        .bytes(fixtures::array_payload(fixtures::log_entries(1, "tenant-load")).into())
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.header("retry-after"), "5");

    let body: Value = response.json();
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["retry_after"], 5);
    assert!(body["utilization"].as_f64().unwrap() >= 0.9);

    ctx.enricher.release();
    assert!(ctx.drain().await, "pool did not drain after release");

    server
        .post("/api/v1/logs")
        .content_type("application/json")
        .bytes(fixtures::array_payload(fixtures::log_entries(1, "tenant-load")).into())
        .await
        .assert_status(StatusCode::ACCEPTED);

    assert!(ctx.drain().await);
    assert_eq!(ctx.aggregator.query("tenant-load", 15).total_requests, 11);
}

/// A batch that does not fit is rejected whole, even below the threshold.
#[tokio::test]
async fn test_partial_fit_is_rejected_whole() {
    let ctx = small_pool(1.0);
    ctx.enricher.hold();
    let server = ctx.server();

    server
        .post("/api/v1/logs")
        .content_type("application/json")
        .bytes(fixtures::array_payload(fixtures::log_entries(8, "tenant-fit")).into())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let response = server
        .post("/api/v1/logs")
        .content_type("application/json")
        .bytes(fixtures::array_payload(fixtures::log_entries(5, "tenant-fit")).into())
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(ctx.pool.stats().jobs_queued, 8);

    ctx.enricher.release();
    assert!(ctx.drain().await);
    assert_eq!(ctx.aggregator.query("tenant-fit", 15).total_requests, 8);
}

/// A slow enricher delays processing but loses nothing.
#[tokio::test]
async fn test_slow_enrichment_completes() {
    let ctx = TestContext::with_options(TestOptions {
        worker_count: 2,
        ..TestOptions::default()
    });
    ctx.enricher.set_delay(Some(Duration::from_millis(5)));
    let server = ctx.server();

    for _ in 0..5 {
        server
            .post("/api/v1/logs")
            .content_type("application/json")
            .bytes(fixtures::array_payload(fixtures::log_entries(10, "tenant-slow")).into())
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    let aggregator = ctx.aggregator.clone();
    assert!(
        wait_until(Duration::from_secs(5), move || {
            aggregator.query("tenant-slow", 15).total_requests == 50
        })
        .await
    );
}
