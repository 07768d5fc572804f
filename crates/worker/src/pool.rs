//! Bounded worker pool.
//!
//! Jobs flow through a bounded job queue to `worker_count` worker tasks,
//! each of which enriches its event and pushes a [`JobResult`] onto a
//! bounded result queue. A single dispatch task drains that queue and hands
//! every processed event to the registered [`ResultHandler`]s.
//!
//! Admission never waits: a full job queue is reported immediately as
//! [`PoolError::QueueFull`], and a full result queue drops the result.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use analytics_core::LogEvent;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use telemetry::{health, metrics};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::enrichment::{Enricher, EnrichmentError};

/// Worker pool errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("job queue is full")]
    QueueFull,

    #[error("worker pool is stopped")]
    PoolStopped,

    #[error("shutdown timed out with {abandoned} tasks still running")]
    ShutdownTimeout { abandoned: usize },
}

/// Callback invoked by the dispatch task for every processed event.
///
/// Handlers run serially on the dispatch task and must not block.
pub type ResultHandler = Arc<dyn Fn(&LogEvent, &str) + Send + Sync>;

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_job_queue_size")]
    pub job_queue_size: usize,
    #[serde(default = "default_result_queue_size")]
    pub result_queue_size: usize,
}

fn default_worker_count() -> usize {
    4
}

fn default_job_queue_size() -> usize {
    10_000
}

fn default_result_queue_size() -> usize {
    1_000
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            job_queue_size: default_job_queue_size(),
            result_queue_size: default_result_queue_size(),
        }
    }
}

/// A unit of work: one event awaiting enrichment.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: String,
    pub event: LogEvent,
    pub enqueued_at: Instant,
}

impl Job {
    pub fn new(event: LogEvent, tenant_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            event,
            enqueued_at: Instant::now(),
        }
    }
}

/// Outcome of one job.
#[derive(Debug)]
pub struct JobResult {
    pub job_id: Uuid,
    pub tenant_id: String,
    pub event: LogEvent,
    /// Set when enrichment failed; the event is still dispatched
    pub enrichment_error: Option<EnrichmentError>,
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    processed: AtomicU64,
    in_progress: AtomicU64,
    dropped_results: AtomicU64,
    enrichment_failures: AtomicU64,
    dispatched: AtomicU64,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub worker_count: usize,
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub queue_utilization: f64,
    pub jobs_queued: u64,
    pub jobs_processed: u64,
    pub jobs_in_progress: u64,
    pub dropped_results: u64,
    pub enrichment_failures: u64,
    pub results_dispatched: u64,
}

type SharedJobReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>;

/// Fixed-size pool of enrichment workers.
///
/// Lifecycle: `new` -> `on_result`* -> `start` -> submissions -> `shutdown`.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    enricher: Arc<dyn Enricher>,
    handlers: Vec<ResultHandler>,

    /// Dropped on shutdown so workers see the queue close
    job_tx: RwLock<Option<mpsc::Sender<Job>>>,
    job_rx: Option<SharedJobReceiver>,
    result_tx: Option<mpsc::Sender<JobResult>>,
    result_rx: Option<mpsc::Receiver<JobResult>>,

    stopped: AtomicBool,
    counters: Arc<Counters>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig, enricher: Arc<dyn Enricher>) -> Self {
        let config = WorkerPoolConfig {
            worker_count: config.worker_count.max(1),
            job_queue_size: config.job_queue_size.max(1),
            result_queue_size: config.result_queue_size.max(1),
        };

        let (job_tx, job_rx) = mpsc::channel(config.job_queue_size);
        let (result_tx, result_rx) = mpsc::channel(config.result_queue_size);

        Self {
            config,
            enricher,
            handlers: Vec::new(),
            job_tx: RwLock::new(Some(job_tx)),
            job_rx: Some(Arc::new(tokio::sync::Mutex::new(job_rx))),
            result_tx: Some(result_tx),
            result_rx: Some(result_rx),
            stopped: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Registers a handler. Handlers added after `start` are never called.
    pub fn on_result(&mut self, handler: ResultHandler) {
        if self.result_rx.is_none() {
            warn!("Result handler registered after start; ignoring");
            return;
        }
        self.handlers.push(handler);
    }

    /// Spawns the workers and the dispatch task.
    ///
    /// Must be called from within a tokio runtime. A second call is a no-op.
    pub fn start(&mut self) {
        let (Some(job_rx), Some(result_tx), Some(result_rx)) =
            (self.job_rx.take(), self.result_tx.take(), self.result_rx.take())
        else {
            warn!("Worker pool already started");
            return;
        };

        let mut tasks = self.tasks.lock();

        for worker_id in 0..self.config.worker_count {
            tasks.push(tokio::spawn(run_worker(
                worker_id,
                job_rx.clone(),
                result_tx.clone(),
                self.enricher.clone(),
                self.counters.clone(),
            )));
        }
        // Workers hold the only result senders: once they exit, the
        // dispatcher drains what is left and stops.
        drop(result_tx);

        tasks.push(tokio::spawn(run_dispatcher(
            result_rx,
            std::mem::take(&mut self.handlers),
            self.counters.clone(),
        )));

        health().worker_pool.set_healthy();
        info!(
            workers = self.config.worker_count,
            job_queue_size = self.config.job_queue_size,
            result_queue_size = self.config.result_queue_size,
            enricher = self.enricher.name(),
            "Worker pool started"
        );
    }

    /// Enqueues one event without waiting.
    pub fn submit_job(&self, event: LogEvent, tenant_id: impl Into<String>) -> Result<(), PoolError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PoolError::PoolStopped);
        }

        let guard = self.job_tx.read();
        let tx = guard.as_ref().ok_or(PoolError::PoolStopped)?;

        match tx.try_send(Job::new(event, tenant_id)) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(PoolError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(PoolError::PoolStopped),
        }
    }

    /// Enqueues every event or none of them.
    ///
    /// Queue slots for the whole batch are reserved up front, so a batch that
    /// does not fit is rejected without any of its events entering the queue.
    pub fn submit_batch(&self, events: Vec<LogEvent>) -> Result<usize, PoolError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PoolError::PoolStopped);
        }
        if events.is_empty() {
            return Ok(0);
        }
        if events.len() > self.config.job_queue_size {
            return Err(PoolError::QueueFull);
        }

        let guard = self.job_tx.read();
        let tx = guard.as_ref().ok_or(PoolError::PoolStopped)?;

        let permits = tx.try_reserve_many(events.len()).map_err(|e| match e {
            TrySendError::Full(_) => PoolError::QueueFull,
            TrySendError::Closed(_) => PoolError::PoolStopped,
        })?;

        let count = events.len();
        for (permit, event) in permits.zip(events) {
            let tenant_id = event.tenant_id.clone();
            permit.send(Job::new(event, tenant_id));
        }

        self.counters.queued.fetch_add(count as u64, Ordering::Relaxed);
        Ok(count)
    }

    /// Jobs currently waiting in the queue.
    pub fn queue_len(&self) -> usize {
        match self.job_tx.read().as_ref() {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            None => 0,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.config.job_queue_size
    }

    /// Fraction of the job queue in use, in `[0, 1]`.
    pub fn queue_utilization(&self) -> f64 {
        self.queue_len() as f64 / self.queue_capacity() as f64
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let queue_len = self.queue_len();
        PoolStats {
            worker_count: self.config.worker_count,
            queue_len,
            queue_capacity: self.queue_capacity(),
            queue_utilization: queue_len as f64 / self.queue_capacity() as f64,
            jobs_queued: self.counters.queued.load(Ordering::Relaxed),
            jobs_processed: self.counters.processed.load(Ordering::Relaxed),
            jobs_in_progress: self.counters.in_progress.load(Ordering::Relaxed),
            dropped_results: self.counters.dropped_results.load(Ordering::Relaxed),
            enrichment_failures: self.counters.enrichment_failures.load(Ordering::Relaxed),
            results_dispatched: self.counters.dispatched.load(Ordering::Relaxed),
        }
    }

    /// Stops admissions, lets workers drain the queue, and waits for every
    /// task up to `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), PoolError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            debug!("Worker pool already stopped");
        }
        info!(timeout_ms = timeout.as_millis() as u64, queued = self.queue_len(), "Shutting down worker pool");
        health().worker_pool.set_unhealthy("shutting down");

        // Closing the queue: workers finish what is buffered, then exit.
        drop(self.job_tx.write().take());

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        let total = tasks.len();
        let tracked: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();

        match tokio::time::timeout(timeout, join_tasks(tasks)).await {
            Ok(()) => {
                health().worker_pool.set_unhealthy("stopped");
                info!(tasks = total, stats = ?self.stats(), "Worker pool stopped");
                Ok(())
            }
            Err(_) => {
                let abandoned = tracked.iter().filter(|t| !t.is_finished()).count();
                error!(
                    abandoned = abandoned,
                    tasks = total,
                    "Worker pool shutdown timed out; abandoning running tasks"
                );
                Err(PoolError::ShutdownTimeout { abandoned })
            }
        }
    }
}

/// Awaits every handle in order; a panicked task is logged, not propagated.
async fn join_tasks(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Worker pool task failed");
        }
    }
}

async fn run_worker(
    worker_id: usize,
    jobs: SharedJobReceiver,
    results: mpsc::Sender<JobResult>,
    enricher: Arc<dyn Enricher>,
    counters: Arc<Counters>,
) {
    debug!(worker_id = worker_id, "Worker started");

    loop {
        let job = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { break };

        counters.in_progress.fetch_add(1, Ordering::Relaxed);
        let result = process_job(job, enricher.as_ref(), &counters).await;
        counters.in_progress.fetch_sub(1, Ordering::Relaxed);
        counters.processed.fetch_add(1, Ordering::Relaxed);
        metrics().jobs_processed.inc();

        if let Err(e) = results.try_send(result) {
            counters.dropped_results.fetch_add(1, Ordering::Relaxed);
            metrics().results_dropped.inc();
            match e {
                TrySendError::Full(r) => warn!(
                    worker_id = worker_id,
                    tenant_id = %r.tenant_id,
                    "Result queue full, dropping result"
                ),
                TrySendError::Closed(r) => warn!(
                    worker_id = worker_id,
                    tenant_id = %r.tenant_id,
                    "Result queue closed, dropping result"
                ),
            }
        }
    }

    debug!(worker_id = worker_id, "Worker stopped");
}

async fn process_job(job: Job, enricher: &dyn Enricher, counters: &Counters) -> JobResult {
    let Job {
        id,
        tenant_id,
        mut event,
        ..
    } = job;
    let started = Instant::now();

    let enrichment_error = match enricher.enrich(&mut event).await {
        Ok(()) => None,
        Err(e) => {
            counters.enrichment_failures.fetch_add(1, Ordering::Relaxed);
            metrics().enrichment_failures.inc();
            warn!(
                job_id = %id,
                tenant_id = %tenant_id,
                ip = %event.ip,
                error = %e,
                "Enrichment failed; continuing without geo"
            );
            Some(e)
        }
    };

    let duration = started.elapsed();
    metrics().enrichment_latency_ms.observe(duration.as_millis() as u64);

    JobResult {
        job_id: id,
        tenant_id,
        event,
        enrichment_error,
        duration,
    }
}

async fn run_dispatcher(
    mut results: mpsc::Receiver<JobResult>,
    handlers: Vec<ResultHandler>,
    counters: Arc<Counters>,
) {
    debug!(handlers = handlers.len(), "Result dispatcher started");

    while let Some(result) = results.recv().await {
        for handler in &handlers {
            handler(&result.event, &result.tenant_id);
        }
        counters.dispatched.fetch_add(1, Ordering::Relaxed);
        metrics().results_dispatched.inc();
    }

    debug!("Result dispatcher stopped");
}
