//! Tests for error handling in the ingest pipeline.
//!
//! Rejected batches must leave nothing behind in the job queue.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

async fn post(ctx: &TestContext, payload: String) -> axum_test::TestResponse {
    ctx.server()
        .post("/api/v1/logs")
        .content_type("application/json")
        .bytes(payload.into())
        .await
}

/// Empty array returns empty_batch
#[tokio::test]
async fn test_empty_batch_returns_400() {
    let ctx = TestContext::new();

    let response = post(&ctx, "[]".to_string()).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "empty_batch");
    assert_eq!(body["message"], "Logs array cannot be empty");

    let response = post(&ctx, r#"{"logs": []}"#.to_string()).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

/// 1001 entries returns batch_too_large
#[tokio::test]
async fn test_too_many_entries_returns_400() {
    let ctx = TestContext::new();

    let response = post(&ctx, fixtures::array_payload(fixtures::oversized_batch())).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "batch_too_large");
    assert_eq!(body["message"], "Maximum batch size is 1000 logs");
    assert_eq!(ctx.pool.stats().jobs_queued, 0);
}

/// Bodies over 1 MiB are rejected before parsing
#[tokio::test]
async fn test_oversized_body_returns_400() {
    let ctx = TestContext::new();

    let response = post(&ctx, fixtures::oversized_body()).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "batch_too_large");
}

/// Malformed JSON and wrong shapes return invalid_request_body
#[tokio::test]
async fn test_invalid_body_returns_400() {
    let ctx = TestContext::new();

    for payload in ["{not json", r#"{"events": []}"#, "42", r#""logs""#] {
        let response = post(&ctx, payload.to_string()).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_request_body", "payload {payload}");
    }
}

/// The first invalid entry is reported with its index and the whole batch
/// is rejected.
#[tokio::test]
async fn test_invalid_entry_rejects_whole_batch() {
    let ctx = TestContext::new();

    let mut entries = fixtures::log_entries(3, "tenant-invalid");
    entries[2]["status_code"] = json!(700);

    let response = post(&ctx, fixtures::array_payload(entries)).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "validation_failed");
    assert_eq!(body["message"], "status_code must be between 100-599");
    assert_eq!(body["log_index"], 2);

    assert_eq!(ctx.pool.stats().jobs_queued, 0);
    assert_eq!(ctx.aggregator.customer_count(), 0);
}

/// Each structural rule produces its own message.
#[tokio::test]
async fn test_field_validation_messages() {
    let ctx = TestContext::new();

    let cases: Vec<(&str, Value, &str)> = vec![
        ("timestamp", json!(0), "timestamp must be positive"),
        ("tenant_id", json!(""), "tenant_id is required"),
        ("status_code", json!(99), "status_code must be between 100-599"),
        ("bytes_sent", json!(-1), "bytes_sent must be non-negative"),
        ("ip", json!("1.1.1"), "invalid ip format"),
    ];

    for (field, value, message) in cases {
        let mut entry = fixtures::log_entry("tenant-fields", 200, 1);
        entry[field] = value;

        let response = post(&ctx, fixtures::array_payload(vec![entry])).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["message"], message, "field {field}");
        assert_eq!(body["log_index"], 0);
    }
}

/// Missing fields are reported against the entry that lacks them.
#[tokio::test]
async fn test_missing_field_returns_400() {
    let ctx = TestContext::new();

    let mut entries = fixtures::log_entries(2, "tenant-missing");
    entries[1].as_object_mut().unwrap().remove("ip");

    let response = post(&ctx, fixtures::array_payload(entries)).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "validation_failed");
    assert_eq!(body["log_index"], 1);
    assert!(body["message"].as_str().unwrap().contains("ip"));
}

/// Requests after the pool has stopped get 503
#[tokio::test]
async fn test_stopped_pool_returns_503() {
    let ctx = TestContext::new();
    ctx.pool
        .shutdown(std::time::Duration::from_secs(1))
        .await
        .expect("pool shutdown");

    let response = post(&ctx, fixtures::array_payload(fixtures::log_entries(1, "t"))).await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"], "service_unavailable");
}

/// Out-of-range and unparsable `minutes` fall back to sane windows.
#[tokio::test]
async fn test_minutes_param_is_forgiving() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for (query, expected) in [("abc", 15), ("0", 15), ("-3", 15), ("60", 15), ("1", 1)] {
        let body: Value = server
            .get(&format!("/api/v1/customers/t/metrics?minutes={query}"))
            .await
            .json();
        assert_eq!(body["window_minutes"], expected, "minutes={query}");
    }
}
