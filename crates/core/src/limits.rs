//! Batch, field, and window limits for the ingestion engine.
//!
//! Per-field limits (tenant id length, ip length, status range) live on the
//! `#[validate]` attributes of `LogEvent`.

// === Batch Limits ===

/// Maximum entries per ingestion batch.
pub const MAX_BATCH_EVENTS: usize = 1000;

/// Maximum batch payload size in bytes (1MB).
///
/// A 1000-entry batch of CDN log lines is well under 256KB.
pub const MAX_BATCH_SIZE_BYTES: usize = 1024 * 1024;

// === Window ===

/// Trailing window served by the aggregator.
pub const DEFAULT_WINDOW_MINUTES: u32 = 15;

/// Minimum wall-clock spacing between piggybacked eviction passes.
pub const EVICTION_INTERVAL_SECS: i64 = 300;

/// Minutes an event may run ahead of the aggregator's clock before it is
/// dropped as clock skew.
pub const MAX_FUTURE_SKEW_MINUTES: i64 = 1;

// === Admission Control ===

/// Job queue utilization at which batches are rejected as overloaded.
pub const DEFAULT_BACKPRESSURE_THRESHOLD: f64 = 0.90;

/// Retry hint returned with overload rejections.
pub const RETRY_AFTER_SECS: u64 = 5;
