//! Ingestion gateway: batch validation, admission control, and the query path.
//!
//! A batch moves through `received -> validated -> admitted`, or stops at the
//! first rejection. Rejection reasons, in the order they are checked:
//! empty batch, too many entries, first invalid entry, overload. A batch is
//! either admitted whole or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use analytics_core::limits::{
    DEFAULT_BACKPRESSURE_THRESHOLD, MAX_BATCH_EVENTS, MAX_BATCH_SIZE_BYTES, RETRY_AFTER_SECS,
};
use analytics_core::{parse_batch, Error, LogEvent, Result, ValidationErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use telemetry::metrics;
use tracing::{debug, error, warn};
use window_aggregator::{AggregatorStats, QueryResult, SlidingWindowAggregator};
use worker::{PoolError, WorkerPool};

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Queue utilization at or above which batches are rejected
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold: f64,
    /// Retry hint returned with overload rejections
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,
}

fn default_backpressure_threshold() -> f64 {
    DEFAULT_BACKPRESSURE_THRESHOLD
}

fn default_retry_after_secs() -> u64 {
    RETRY_AFTER_SECS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backpressure_threshold: default_backpressure_threshold(),
            retry_after_secs: default_retry_after_secs(),
        }
    }
}

/// Result of an admitted batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accepted {
    pub accepted: usize,
    pub buffer_utilization: f64,
}

/// Front door of the engine.
pub struct IngestionGateway {
    pool: Arc<WorkerPool>,
    aggregator: Arc<SlidingWindowAggregator>,
    config: GatewayConfig,
}

impl IngestionGateway {
    pub fn new(
        pool: Arc<WorkerPool>,
        aggregator: Arc<SlidingWindowAggregator>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            pool,
            aggregator,
            config,
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn aggregator(&self) -> &Arc<SlidingWindowAggregator> {
        &self.aggregator
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Parses a raw request body and runs it through [`accept`](Self::accept).
    pub fn accept_body(&self, body: &[u8]) -> Result<Accepted> {
        if body.len() > MAX_BATCH_SIZE_BYTES {
            metrics().batches_received.inc();
            return Err(Error::validation(
                ValidationErrorCode::BatchTooLarge,
                format!(
                    "Payload size {}KB exceeds {}KB limit",
                    body.len() / 1024,
                    MAX_BATCH_SIZE_BYTES / 1024
                ),
            ));
        }

        let entries = parse_batch(body).inspect_err(|_| {
            metrics().batches_received.inc();
        })?;
        self.accept(entries)
    }

    /// Validates a batch and, if the pool has room, enqueues every entry.
    pub fn accept(&self, entries: Vec<Value>) -> Result<Accepted> {
        metrics().batches_received.inc();

        if entries.is_empty() {
            return Err(Error::validation(
                ValidationErrorCode::EmptyBatch,
                "Logs array cannot be empty",
            ));
        }
        if entries.len() > MAX_BATCH_EVENTS {
            return Err(Error::validation(
                ValidationErrorCode::BatchTooLarge,
                format!("Maximum batch size is {} logs", MAX_BATCH_EVENTS),
            ));
        }

        let count = entries.len();
        metrics().events_received.inc_by(count as u64);

        let events = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| LogEvent::from_entry(index, entry))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| {
                metrics().validation_failures.inc();
                debug!(error = %e, batch_size = count, "Batch failed validation");
            })?;

        let utilization = self.pool.queue_utilization();
        if utilization >= self.config.backpressure_threshold {
            return Err(self.reject_overloaded(utilization, count, "utilization above threshold"));
        }

        match self.pool.submit_batch(events) {
            Ok(accepted) => {
                let buffer_utilization = self.pool.queue_utilization();
                metrics().batches_accepted.inc();
                metrics().events_accepted.inc_by(accepted as u64);
                metrics().backpressure_active.set(0);
                debug!(accepted = accepted, buffer_utilization = buffer_utilization, "Batch admitted");
                Ok(Accepted {
                    accepted,
                    buffer_utilization,
                })
            }
            Err(PoolError::QueueFull) => {
                Err(self.reject_overloaded(self.pool.queue_utilization(), count, "queue full"))
            }
            Err(PoolError::PoolStopped) => {
                warn!(batch_size = count, "Rejecting batch, worker pool is stopped");
                Err(Error::unavailable("ingestion pipeline is shutting down"))
            }
            Err(e) => {
                error!(error = %e, "Unexpected worker pool error");
                Err(Error::internal(e.to_string()))
            }
        }
    }

    fn reject_overloaded(&self, utilization: f64, batch_size: usize, reason: &str) -> Error {
        metrics().rate_limited_requests.inc();
        metrics().backpressure_active.set(1);
        warn!(
            buffer_utilization = utilization,
            threshold = self.config.backpressure_threshold,
            batch_size = batch_size,
            reason = reason,
            "Backpressure triggered, rejecting batch"
        );
        Error::overloaded(utilization, self.config.retry_after_secs)
    }

    /// Parses a `minutes` query value.
    ///
    /// Missing, unparsable, or non-positive values fall back to the full
    /// window; larger values are clamped to it.
    pub fn resolve_minutes(&self, raw: Option<&str>) -> u32 {
        let window = self.aggregator.window_minutes();
        match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
            Some(m) if m > 0 => self.aggregator.clamp_minutes(m.min(i64::from(window)) as u32),
            _ => window,
        }
    }

    /// Traffic summary for one tenant.
    pub fn summary(&self, tenant_id: &str, minutes: u32) -> QueryResult {
        self.aggregator.query(tenant_id, minutes)
    }

    /// Summaries for every tracked tenant.
    pub fn snapshot(&self, minutes: u32) -> HashMap<String, QueryResult> {
        self.aggregator.query_all(minutes)
    }

    pub fn aggregator_stats(&self) -> AggregatorStats {
        self.aggregator.stats()
    }
}
