//! Persistence boundary.
//!
//! [`BatchWriter`] is registered as a pool result handler. It accumulates
//! [`EnrichedEvent`]s under a short-lived lock and hands full batches to a
//! flush task over a bounded channel, so the dispatch task never waits on
//! storage. The flush task writes through an [`EventSink`] with retries,
//! flushes batches that have aged out, and drains on shutdown.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use analytics_core::{EnrichedEvent, LogEvent, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use telemetry::{health, metrics};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::pool::ResultHandler;

/// Destination for enriched events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Persist a batch. Returns the number of events written.
    async fn write_batch(&self, events: Vec<EnrichedEvent>) -> Result<usize>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Sink used when no store is attached: logs a summary of every batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn write_batch(&self, events: Vec<EnrichedEvent>) -> Result<usize> {
        let count = events.len();
        let mut tenants: Vec<&str> = events.iter().map(|e| e.tenant_id.as_str()).collect();
        tenants.sort_unstable();
        tenants.dedup();
        let bytes: u64 = events.iter().map(|e| e.bytes_sent).sum();

        info!(
            events = count,
            tenants = tenants.len(),
            bytes = bytes,
            oldest = events.iter().map(|e| e.timestamp).min(),
            newest = events.iter().map(|e| e.timestamp).max(),
            "Enriched batch"
        );
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Batch writer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Events per batch before an immediate flush
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Maximum age of a partial batch before it is flushed
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
    /// Full batches waiting for the flush task
    #[serde(default = "default_flush_queue_size")]
    pub flush_queue_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_size() -> usize {
    1000
}

fn default_max_age_ms() -> u64 {
    1000
}

fn default_flush_queue_size() -> usize {
    16
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_age_ms: default_max_age_ms(),
            flush_queue_size: default_flush_queue_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl BatchConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Partial batch being filled by the dispatch task.
#[derive(Debug)]
struct PendingBatch {
    events: Vec<EnrichedEvent>,
    created_at: Instant,
}

impl PendingBatch {
    fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            created_at: Instant::now(),
        }
    }

    fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Take events and reset the batch.
    fn take(&mut self) -> Vec<EnrichedEvent> {
        self.created_at = Instant::now();
        std::mem::take(&mut self.events)
    }
}

#[derive(Debug, Default)]
struct WriterCounters {
    appended: AtomicU64,
    flushed: AtomicU64,
    flush_count: AtomicU64,
    flush_errors: AtomicU64,
    dropped_batches: AtomicU64,
    /// Unix millis of the last successful write
    last_flush_at: AtomicI64,
}

/// Batch writer statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchWriterStats {
    pub sink: String,
    pub events_appended: u64,
    pub events_flushed: u64,
    pub flush_count: u64,
    pub flush_errors: u64,
    pub dropped_batches: u64,
    pub pending_events: usize,
    pub last_flush_at: Option<i64>,
}

/// Accumulates enriched events and flushes them to an [`EventSink`].
pub struct BatchWriter {
    config: BatchConfig,
    sink: Arc<dyn EventSink>,
    pending: Mutex<PendingBatch>,
    flush_tx: Mutex<Option<mpsc::Sender<Vec<EnrichedEvent>>>>,
    counters: WriterCounters,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchWriter {
    /// Creates the writer and spawns its flush task.
    pub fn spawn(config: BatchConfig, sink: Arc<dyn EventSink>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.flush_queue_size.max(1));

        let writer = Arc::new(Self {
            pending: Mutex::new(PendingBatch::new(config.max_size)),
            config,
            sink,
            flush_tx: Mutex::new(Some(tx)),
            counters: WriterCounters::default(),
            task: Mutex::new(None),
        });

        let task = tokio::spawn(writer.clone().run(rx));
        *writer.task.lock() = Some(task);

        health().sink.set_healthy();
        info!(
            sink = writer.sink.name(),
            max_size = writer.config.max_size,
            max_age_ms = writer.config.max_age_ms,
            "Batch writer started"
        );
        writer
    }

    /// Result handler that converts and appends every dispatched event.
    pub fn handler(self: &Arc<Self>) -> ResultHandler {
        let writer = self.clone();
        Arc::new(move |event: &LogEvent, tenant_id: &str| {
            writer.append(EnrichedEvent::from_log(event, tenant_id));
        })
    }

    /// Adds one event; hands the batch to the flush task once full.
    pub fn append(&self, event: EnrichedEvent) {
        self.counters.appended.fetch_add(1, Ordering::Relaxed);

        let full = {
            let mut pending = self.pending.lock();
            pending.events.push(event);
            (pending.events.len() >= self.config.max_size).then(|| pending.take())
        };

        if let Some(batch) = full {
            self.hand_off(batch);
        }
    }

    fn hand_off(&self, batch: Vec<EnrichedEvent>) {
        let count = batch.len();
        let guard = self.flush_tx.lock();
        let Some(tx) = guard.as_ref() else {
            self.record_drop(count, "writer closed");
            return;
        };

        match tx.try_send(batch) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.record_drop(count, "flush queue full"),
            Err(TrySendError::Closed(_)) => self.record_drop(count, "flush task stopped"),
        }
    }

    fn record_drop(&self, count: usize, reason: &str) {
        self.counters.dropped_batches.fetch_add(1, Ordering::Relaxed);
        metrics().sink_batches_dropped.inc();
        warn!(events = count, reason = reason, "Dropping enriched batch");
    }

    /// Takes the pending batch if it is non-empty and older than `max_age`.
    fn take_aged(&self) -> Option<Vec<EnrichedEvent>> {
        let mut pending = self.pending.lock();
        (!pending.events.is_empty() && pending.age() >= self.config.max_age()).then(|| pending.take())
    }

    fn take_all(&self) -> Vec<EnrichedEvent> {
        self.pending.lock().take()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().events.len()
    }

    pub fn stats(&self) -> BatchWriterStats {
        let last = self.counters.last_flush_at.load(Ordering::Relaxed);
        BatchWriterStats {
            sink: self.sink.name().to_string(),
            events_appended: self.counters.appended.load(Ordering::Relaxed),
            events_flushed: self.counters.flushed.load(Ordering::Relaxed),
            flush_count: self.counters.flush_count.load(Ordering::Relaxed),
            flush_errors: self.counters.flush_errors.load(Ordering::Relaxed),
            dropped_batches: self.counters.dropped_batches.load(Ordering::Relaxed),
            pending_events: self.pending_len(),
            last_flush_at: (last > 0).then_some(last),
        }
    }

    /// Closes the flush queue and waits for the final drain.
    ///
    /// Call after the worker pool has shut down so no more events arrive.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        drop(self.flush_tx.lock().take());
        let task = self.task.lock().take();

        let Some(task) = task else {
            return true;
        };

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(())) => {
                info!(stats = ?self.stats(), "Batch writer stopped");
                true
            }
            Ok(Err(e)) => {
                error!(error = %e, "Batch writer task failed");
                false
            }
            Err(_) => {
                error!(pending = self.pending_len(), "Batch writer shutdown timed out");
                false
            }
        }
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Vec<EnrichedEvent>>) {
        let mut ticker = tokio::time::interval(self.config.max_age());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                batch = rx.recv() => match batch {
                    Some(batch) => self.write(batch).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some(batch) = self.take_aged() {
                        self.write(batch).await;
                    }
                }
            }
        }

        let remaining = self.take_all();
        if !remaining.is_empty() {
            debug!(events = remaining.len(), "Draining pending batch");
            self.write(remaining).await;
        }
    }

    async fn write(&self, batch: Vec<EnrichedEvent>) {
        let count = batch.len();
        let started = Instant::now();

        match self.write_with_retry(batch).await {
            Ok(written) => {
                self.counters.flushed.fetch_add(written as u64, Ordering::Relaxed);
                self.counters.flush_count.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .last_flush_at
                    .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);

                metrics().sink_batches_written.inc();
                metrics().sink_events_written.inc_by(written as u64);
                metrics()
                    .sink_write_latency_ms
                    .observe(started.elapsed().as_millis() as u64);
                health().sink.set_healthy();
                debug!(events = written, duration_ms = started.elapsed().as_millis() as u64, "Batch flushed");
            }
            Err(e) => {
                self.counters.flush_errors.fetch_add(1, Ordering::Relaxed);
                metrics().sink_write_errors.inc();
                health().sink.set_unhealthy(e.to_string());
                error!(
                    events = count,
                    sink = self.sink.name(),
                    error = %e,
                    "Failed to write batch after retries"
                );
            }
        }
    }

    async fn write_with_retry(&self, batch: Vec<EnrichedEvent>) -> Result<usize> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff() * attempt;
                warn!(
                    attempt = attempt,
                    backoff_ms = %backoff.as_millis(),
                    sink = self.sink.name(),
                    "Retrying batch write"
                );
                tokio::time::sleep(backoff).await;
            }

            match self.sink.write_batch(batch.clone()).await {
                Ok(written) => return Ok(written),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| analytics_core::Error::internal("batch write failed")))
    }
}
