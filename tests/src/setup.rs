//! Common test setup functions.

use std::sync::Arc;
use std::time::Duration;

use analytics_core::LogEvent;
use api::{router, AppState, GatewayConfig, IngestionGateway};
use axum::Router;
use axum_test::TestServer;
use telemetry::metrics;
use window_aggregator::{AggregatorConfig, SlidingWindowAggregator};
use worker::{BatchConfig, BatchWriter, WorkerPool, WorkerPoolConfig};

use crate::mocks::{MemorySink, MockEnricher};

/// Knobs for building a [`TestContext`].
#[derive(Debug, Clone)]
pub struct TestOptions {
    pub worker_count: usize,
    pub job_queue_size: usize,
    pub result_queue_size: usize,
    pub backpressure_threshold: f64,
    pub window_minutes: u32,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            worker_count: 4,
            job_queue_size: 10_000,
            result_queue_size: 1_000,
            backpressure_threshold: 0.90,
            window_minutes: 15,
        }
    }
}

/// Fully wired engine with a mock enricher and an in-memory sink.
///
/// Uses the production router, gateway, worker pool, aggregator and batch
/// writer; only the enrichment backend and the persistence sink are fakes.
pub struct TestContext {
    pub aggregator: Arc<SlidingWindowAggregator>,
    pub pool: Arc<WorkerPool>,
    pub enricher: Arc<MockEnricher>,
    pub sink: MemorySink,
    pub writer: Arc<BatchWriter>,
    pub router: Router,
}

impl TestContext {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        let aggregator = Arc::new(SlidingWindowAggregator::new(AggregatorConfig {
            window_minutes: options.window_minutes,
            ..AggregatorConfig::default()
        }));
        let enricher = Arc::new(MockEnricher::new());
        let sink = MemorySink::new();
        let writer = BatchWriter::spawn(
            BatchConfig {
                max_size: 100,
                max_age_ms: 20,
                ..BatchConfig::default()
            },
            Arc::new(sink.clone()),
        );

        let mut pool = WorkerPool::new(
            WorkerPoolConfig {
                worker_count: options.worker_count,
                job_queue_size: options.job_queue_size,
                result_queue_size: options.result_queue_size,
            },
            enricher.clone(),
        );
        {
            let aggregator = aggregator.clone();
            pool.on_result(Arc::new(move |event: &LogEvent, tenant_id: &str| {
                aggregator.record(tenant_id, event.timestamp, event.status_code, event.bytes());
                metrics().events_aggregated.inc();
            }));
        }
        pool.on_result(writer.handler());
        pool.start();
        let pool = Arc::new(pool);

        let gateway = Arc::new(IngestionGateway::new(
            pool.clone(),
            aggregator.clone(),
            GatewayConfig {
                backpressure_threshold: options.backpressure_threshold,
                ..GatewayConfig::default()
            },
        ));
        let router = router(AppState::new(gateway).with_batch_writer(writer.clone()));

        Self {
            aggregator,
            pool,
            enricher,
            sink,
            writer,
            router,
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Waits until every queued job has been processed and dispatched.
    pub async fn drain(&self) -> bool {
        let pool = self.pool.clone();
        wait_until(Duration::from_secs(5), move || {
            let stats = pool.stats();
            stats.jobs_processed == stats.jobs_queued
                && stats.results_dispatched + stats.dropped_results == stats.jobs_processed
        })
        .await
    }

    /// Waits until the sink holds at least `count` events.
    pub async fn wait_for_sink(&self, count: usize) -> bool {
        let sink = self.sink.clone();
        wait_until(Duration::from_secs(5), move || sink.event_count() >= count).await
    }
}

/// Polls `condition` every 5ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
