//! Test fixtures and log generators.

use chrono::Utc;
use serde_json::{json, Value};

/// A valid log entry stamped with the current time.
pub fn log_entry(tenant_id: &str, status_code: i32, bytes_sent: i64) -> Value {
    log_entry_at(tenant_id, Utc::now().timestamp(), status_code, bytes_sent)
}

pub fn log_entry_at(tenant_id: &str, timestamp: i64, status_code: i32, bytes_sent: i64) -> Value {
    json!({
        "tenant_id": tenant_id,
        "timestamp": timestamp,
        "status_code": status_code,
        "bytes_sent": bytes_sent,
        "ip": "203.0.113.10"
    })
}

/// N successful requests of 100 bytes each for one tenant.
pub fn log_entries(n: usize, tenant_id: &str) -> Vec<Value> {
    (0..n).map(|_| log_entry(tenant_id, 200, 100)).collect()
}

/// One entry per status class: 2xx, 3xx, 4xx, 5xx.
pub fn mixed_status_entries(tenant_id: &str) -> Vec<Value> {
    [200, 301, 404, 503]
        .into_iter()
        .map(|status| log_entry(tenant_id, status, 250))
        .collect()
}

/// Bare array payload.
pub fn array_payload(entries: Vec<Value>) -> String {
    Value::Array(entries).to_string()
}

/// `{ "logs": [...] }` payload.
pub fn object_payload(entries: Vec<Value>) -> String {
    json!({ "logs": entries }).to_string()
}

/// A batch one entry over the limit.
pub fn oversized_batch() -> Vec<Value> {
    log_entries(1001, "tenant-oversized")
}

/// A syntactically valid payload larger than 1 MiB.
pub fn oversized_body() -> String {
    let mut entry = log_entry("tenant-huge", 200, 1);
    entry["padding"] = Value::String("x".repeat(1024 * 1024 + 1));
    array_payload(vec![entry])
}
