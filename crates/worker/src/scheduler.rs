//! Periodic background tasks.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use telemetry::metrics;
use window_aggregator::{unix_now, SlidingWindowAggregator};

use crate::pool::WorkerPool;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Gauge refresh and metrics log interval
    pub metrics_interval: Duration,
    /// Interval of the background eviction sweep. Eviction piggybacked on
    /// `record` stays the primary path; the sweep only reclaims tenants
    /// that stop sending entirely.
    pub eviction_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            metrics_interval: Duration::from_secs(60),   // 1 minute
            eviction_interval: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Background task scheduler.
pub struct WorkerScheduler {
    config: SchedulerConfig,
    pool: Arc<WorkerPool>,
    aggregator: Arc<SlidingWindowAggregator>,
}

impl WorkerScheduler {
    pub fn new(
        config: SchedulerConfig,
        pool: Arc<WorkerPool>,
        aggregator: Arc<SlidingWindowAggregator>,
    ) -> Self {
        Self {
            config,
            pool,
            aggregator,
        }
    }

    /// Starts all background loops. Abort the handles to stop them.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_reporter().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_eviction_sweep().await;
        }));

        info!("Background tasks started");
        handles
    }

    /// Copies pool and aggregator state into gauges.
    pub fn refresh_gauges(&self) {
        let m = metrics();
        m.queue_depth.set(self.pool.queue_len() as u64);
        m.tracked_tenants.set(self.aggregator.customer_count() as u64);
    }

    async fn run_metrics_reporter(&self) {
        let mut ticker = interval(self.config.metrics_interval);

        loop {
            ticker.tick().await;
            self.refresh_gauges();

            let snapshot = metrics().snapshot();
            let pool = self.pool.stats();
            info!(
                events_accepted = snapshot.events_accepted,
                rate_limited = snapshot.rate_limited_requests,
                validation_failures = snapshot.validation_failures,
                jobs_processed = pool.jobs_processed,
                dropped_results = pool.dropped_results,
                enrichment_failures = pool.enrichment_failures,
                queue_utilization = pool.queue_utilization,
                tracked_tenants = snapshot.tracked_tenants,
                "Engine metrics"
            );
        }
    }

    /// Extra sweep for fully idle tenants. With no incoming events nothing
    /// triggers the eviction piggybacked on `record`, so their windows would
    /// otherwise stay resident.
    async fn run_eviction_sweep(&self) {
        let mut ticker = interval(self.config.eviction_interval);
        // First tick fires immediately; nothing to evict at startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = self.aggregator.evict_stale_at(unix_now());
            debug!(
                evicted = evicted,
                remaining = self.aggregator.customer_count(),
                "Eviction sweep"
            );
        }
    }
}
