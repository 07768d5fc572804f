//! In-process metrics registry.
//!
//! Every field is an atomic, so recording never takes a lock and can happen
//! from request handlers, pool workers, and the dispatch task alike.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram with fixed millisecond buckets.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, +inf
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, u64::MAX];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// (upper bound ms, count) pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Engine-wide metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    // Gateway
    pub batches_received: Counter,
    pub batches_accepted: Counter,
    pub events_received: Counter,
    pub events_accepted: Counter,
    pub validation_failures: Counter,
    pub rate_limited_requests: Counter,

    // Worker pool
    pub jobs_processed: Counter,
    pub enrichment_failures: Counter,
    pub results_dropped: Counter,
    pub results_dispatched: Counter,
    pub events_aggregated: Counter,

    // Persistence sink
    pub sink_batches_written: Counter,
    pub sink_events_written: Counter,
    pub sink_write_errors: Counter,
    pub sink_batches_dropped: Counter,

    // Latency
    pub ingest_latency_ms: Histogram,
    pub enrichment_latency_ms: Histogram,
    pub sink_write_latency_ms: Histogram,

    // Gauges
    pub queue_depth: Gauge,
    pub backpressure_active: Gauge,
    pub tracked_tenants: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub batches_received: u64,
    pub batches_accepted: u64,
    pub events_received: u64,
    pub events_accepted: u64,
    pub validation_failures: u64,
    pub rate_limited_requests: u64,
    pub jobs_processed: u64,
    pub enrichment_failures: u64,
    pub results_dropped: u64,
    pub results_dispatched: u64,
    pub events_aggregated: u64,
    pub sink_batches_written: u64,
    pub sink_events_written: u64,
    pub sink_write_errors: u64,
    pub sink_batches_dropped: u64,
    pub ingest_latency_mean_ms: f64,
    pub enrichment_latency_mean_ms: f64,
    pub sink_write_latency_mean_ms: f64,
    pub queue_depth: u64,
    pub backpressure_active: bool,
    pub tracked_tenants: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            batches_received: self.batches_received.get(),
            batches_accepted: self.batches_accepted.get(),
            events_received: self.events_received.get(),
            events_accepted: self.events_accepted.get(),
            validation_failures: self.validation_failures.get(),
            rate_limited_requests: self.rate_limited_requests.get(),
            jobs_processed: self.jobs_processed.get(),
            enrichment_failures: self.enrichment_failures.get(),
            results_dropped: self.results_dropped.get(),
            results_dispatched: self.results_dispatched.get(),
            events_aggregated: self.events_aggregated.get(),
            sink_batches_written: self.sink_batches_written.get(),
            sink_events_written: self.sink_events_written.get(),
            sink_write_errors: self.sink_write_errors.get(),
            sink_batches_dropped: self.sink_batches_dropped.get(),
            ingest_latency_mean_ms: self.ingest_latency_ms.mean(),
            enrichment_latency_mean_ms: self.enrichment_latency_ms.mean(),
            sink_write_latency_mean_ms: self.sink_write_latency_ms.mean(),
            queue_depth: self.queue_depth.get(),
            backpressure_active: self.backpressure_active.get() > 0,
            tracked_tenants: self.tracked_tenants.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
