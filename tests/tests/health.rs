//! Tests for health check endpoints.
//!
//! The health registry is process-global, so nothing in this binary shuts a
//! pool down.

use axum::http::StatusCode;
use integration_tests::setup::TestContext;
use serde_json::Value;

/// /health returns the full report
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();

    for field in ["status", "queue_depth", "queue_utilization", "tracked_customers", "components"] {
        assert!(body.get(field).is_some(), "Response should have '{field}' field");
    }

    let names: Vec<&str> = body["components"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, ["worker_pool", "enrichment", "sink"]);
}

/// Started pool reports a serving status
#[tokio::test]
async fn test_health_endpoint_status() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let body: Value = server.get("/health").await.json();
    let status = body["status"].as_str().unwrap_or("");
    // Enrichment health is only set by the binary
    assert!(
        status == "healthy" || status == "degraded",
        "Status should be 'healthy' or 'degraded', got '{}'",
        status
    );
    assert_eq!(body["queue_depth"], 0);
    assert_eq!(body["tracked_customers"], 0);
}

/// Liveness is unconditional
#[tokio::test]
async fn test_liveness_probe() {
    let ctx = TestContext::new();
    ctx.server().get("/health/live").await.assert_status_ok();
}

/// Readiness follows the worker pool
#[tokio::test]
async fn test_readiness_probe() {
    let ctx = TestContext::new();
    ctx.server().get("/health/ready").await.assert_status(StatusCode::OK);
}
