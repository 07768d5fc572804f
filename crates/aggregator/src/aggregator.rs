//! Sliding-window aggregator over all tenants.
//!
//! One `RwLock` guards the tenant map. `record` takes the write lock and is
//! the only path that slides or zeroes rings (and the only path that evicts
//! idle tenants). `query`/`query_all` take the read lock and compute their
//! result from the rings as stored.

use std::collections::HashMap;

use analytics_core::limits::{
    DEFAULT_WINDOW_MINUTES, EVICTION_INTERVAL_SECS, MAX_FUTURE_SKEW_MINUTES,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::status::StatusClass;
use crate::window::{CustomerWindow, MinuteCounter};

/// Aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Trailing window served to queries
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    /// Minimum wall-clock seconds between eviction passes
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: i64,
}

fn default_window_minutes() -> u32 {
    DEFAULT_WINDOW_MINUTES
}

fn default_eviction_interval_secs() -> i64 {
    EVICTION_INTERVAL_SECS
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

/// Traffic summary for one tenant over a trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub status_2xx: u64,
    pub status_3xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
    pub total_requests: u64,
    pub total_bytes: u64,
    pub requests_per_second: f64,
    pub window_minutes: u32,
}

impl QueryResult {
    /// All-zero result for a tenant with no traffic.
    pub fn empty(window_minutes: u32) -> Self {
        Self {
            window_minutes,
            ..Self::default()
        }
    }

    fn from_counter(counter: &MinuteCounter, window_minutes: u32) -> Self {
        let seconds = f64::from(window_minutes) * 60.0;
        Self {
            status_2xx: counter.count(StatusClass::Success),
            status_3xx: counter.count(StatusClass::Redirect),
            status_4xx: counter.count(StatusClass::ClientError),
            status_5xx: counter.count(StatusClass::ServerError),
            total_requests: counter.total_requests,
            total_bytes: counter.total_bytes,
            requests_per_second: counter.total_requests as f64 / seconds,
            window_minutes,
        }
    }
}

/// Memory accounting snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorStats {
    pub tracked_customers: usize,
    pub window_minutes: u32,
    pub bucket_count: usize,
    pub bytes_per_customer: usize,
    pub approx_memory_bytes: usize,
}

struct Inner {
    windows: HashMap<String, CustomerWindow>,
    /// Unix seconds of the last eviction pass
    last_eviction: i64,
}

/// Per-tenant sliding-window traffic counters.
///
/// Construct one per service and share it by `Arc`.
pub struct SlidingWindowAggregator {
    config: AggregatorConfig,
    /// window + 1 slots, so the oldest requested minute never aliases the
    /// minute currently being written
    bucket_count: usize,
    inner: RwLock<Inner>,
}

/// Current wall-clock time, unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn minute_of(timestamp: i64) -> i64 {
    timestamp.div_euclid(60)
}

impl SlidingWindowAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        let window_minutes = config.window_minutes.max(1);
        let config = AggregatorConfig {
            window_minutes,
            ..config
        };

        info!(
            window_minutes = window_minutes,
            bucket_count = window_minutes + 1,
            eviction_interval_secs = config.eviction_interval_secs,
            "Sliding window aggregator initialized"
        );

        Self {
            bucket_count: window_minutes as usize + 1,
            config,
            inner: RwLock::new(Inner {
                windows: HashMap::new(),
                last_eviction: unix_now(),
            }),
        }
    }

    pub fn window_minutes(&self) -> u32 {
        self.config.window_minutes
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Records one request at the current wall-clock time.
    pub fn record(&self, tenant_id: &str, timestamp: i64, status_code: i32, bytes: u64) {
        self.record_at(tenant_id, timestamp, status_code, bytes, unix_now());
    }

    /// Records one request, treating `now` (unix seconds) as the current time.
    ///
    /// Returns `false` if the event was dropped: older than the tenant's ring,
    /// or more than `MAX_FUTURE_SKEW_MINUTES` ahead of `now`. A far-future
    /// event would otherwise slide the ring past every correctly timed one.
    pub fn record_at(
        &self,
        tenant_id: &str,
        timestamp: i64,
        status_code: i32,
        bytes: u64,
        now: i64,
    ) -> bool {
        let minute = minute_of(timestamp);
        let class = StatusClass::from_code(status_code);

        if minute > minute_of(now) + MAX_FUTURE_SKEW_MINUTES {
            trace!(
                tenant_id = %tenant_id,
                minute = minute,
                now_minute = minute_of(now),
                "Dropping event ahead of clock"
            );
            return false;
        }

        let mut inner = self.inner.write();

        if now - inner.last_eviction >= self.config.eviction_interval_secs {
            inner.last_eviction = now;
            let evicted = Self::evict_locked(&mut inner.windows, minute_of(now), self.config.window_minutes);
            if evicted > 0 {
                info!(evicted = evicted, remaining = inner.windows.len(), "Evicted idle tenant windows");
            }
        }

        let bucket_count = self.bucket_count;
        let window = inner
            .windows
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                debug!(tenant_id = %tenant_id, "Creating tenant window");
                CustomerWindow::new(bucket_count, minute_of(now))
            });

        let recorded = window.record(minute, class, bytes);
        if !recorded {
            trace!(
                tenant_id = %tenant_id,
                minute = minute,
                window_start = window.start_minute(),
                "Dropping event older than window"
            );
        }
        recorded
    }

    /// Summarizes the most recent `minutes` minutes for a tenant.
    pub fn query(&self, tenant_id: &str, minutes: u32) -> QueryResult {
        self.query_at(tenant_id, minutes, unix_now())
    }

    /// Summarizes the `minutes` minutes ending at `now` (unix seconds).
    ///
    /// `minutes` is clamped to `[1, window_minutes]`. Unknown tenants get an
    /// all-zero result.
    pub fn query_at(&self, tenant_id: &str, minutes: u32, now: i64) -> QueryResult {
        let minutes = self.clamp_minutes(minutes);
        let inner = self.inner.read();

        match inner.windows.get(tenant_id) {
            Some(window) => QueryResult::from_counter(&window.sum(minute_of(now), minutes), minutes),
            None => QueryResult::empty(minutes),
        }
    }

    /// Summaries for every tracked tenant, taken under one read lock.
    pub fn query_all(&self, minutes: u32) -> HashMap<String, QueryResult> {
        self.query_all_at(minutes, unix_now())
    }

    pub fn query_all_at(&self, minutes: u32, now: i64) -> HashMap<String, QueryResult> {
        let minutes = self.clamp_minutes(minutes);
        let now_minute = minute_of(now);
        let inner = self.inner.read();

        inner
            .windows
            .iter()
            .map(|(tenant, window)| {
                (
                    tenant.clone(),
                    QueryResult::from_counter(&window.sum(now_minute, minutes), minutes),
                )
            })
            .collect()
    }

    /// Runs an eviction pass immediately. Returns the number of tenants removed.
    pub fn evict_stale_at(&self, now: i64) -> usize {
        let mut inner = self.inner.write();
        inner.last_eviction = now;
        Self::evict_locked(&mut inner.windows, minute_of(now), self.config.window_minutes)
    }

    fn evict_locked(
        windows: &mut HashMap<String, CustomerWindow>,
        now_minute: i64,
        window_minutes: u32,
    ) -> usize {
        let before = windows.len();
        let max_idle = i64::from(window_minutes) + 1;
        windows.retain(|_, window| now_minute - window.newest_minute() <= max_idle);
        before - windows.len()
    }

    pub fn clamp_minutes(&self, minutes: u32) -> u32 {
        minutes.clamp(1, self.config.window_minutes)
    }

    pub fn customer_count(&self) -> usize {
        self.inner.read().windows.len()
    }

    pub fn stats(&self) -> AggregatorStats {
        let tracked = self.customer_count();
        let bytes_per_customer = std::mem::size_of::<CustomerWindow>()
            + self.bucket_count * std::mem::size_of::<MinuteCounter>();

        AggregatorStats {
            tracked_customers: tracked,
            window_minutes: self.config.window_minutes,
            bucket_count: self.bucket_count,
            bytes_per_customer,
            approx_memory_bytes: tracked * bytes_per_customer,
        }
    }
}

impl Default for SlidingWindowAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}
