//! Edge Analytics Engine
//!
//! Multi-tenant CDN log ingestion:
//! - batch validation and backpressure-aware admission
//! - worker pool enrichment with client network metadata
//! - per-tenant sliding-window traffic aggregation
//! - batched hand-off of enriched events to a downstream sink

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use analytics_core::LogEvent;
use api::{router, AppState, GatewayConfig, IngestionGateway};
use telemetry::{health, init_tracing_from_env, metrics};
use window_aggregator::{AggregatorConfig, SlidingWindowAggregator};
use worker::{
    BatchConfig, BatchWriter, Enricher, GeoRule, NetworkEnricher, SchedulerConfig, TracingSink,
    WorkerPool, WorkerPoolConfig, WorkerScheduler,
};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    aggregator: AggregatorConfig,

    #[serde(default)]
    workers: WorkerPoolConfig,

    #[serde(default)]
    gateway: GatewayConfig,

    #[serde(default)]
    sink: BatchConfig,

    /// Network lookup table for enrichment
    #[serde(default)]
    geo_rules: Vec<GeoRule>,

    #[serde(default = "default_shutdown_timeout_secs")]
    shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            aggregator: AggregatorConfig::default(),
            workers: WorkerPoolConfig::default(),
            gateway: GatewayConfig::default(),
            sink: BatchConfig::default(),
            geo_rules: Vec::new(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Edge Analytics Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        window_minutes = config.aggregator.window_minutes,
        workers = config.workers.worker_count,
        job_queue_size = config.workers.job_queue_size,
        backpressure_threshold = config.gateway.backpressure_threshold,
        geo_rules = config.geo_rules.len(),
        "Loaded configuration"
    );

    let aggregator = Arc::new(SlidingWindowAggregator::new(config.aggregator.clone()));

    let enricher = Arc::new(NetworkEnricher::new(config.geo_rules.clone()));
    health().enrichment.set_healthy();

    let batch_writer = BatchWriter::spawn(config.sink.clone(), Arc::new(TracingSink));

    let mut pool = WorkerPool::new(config.workers.clone(), enricher.clone());
    {
        let aggregator = aggregator.clone();
        pool.on_result(Arc::new(move |event: &LogEvent, tenant_id: &str| {
            aggregator.record(tenant_id, event.timestamp, event.status_code, event.bytes());
            metrics().events_aggregated.inc();
        }));
    }
    pool.on_result(batch_writer.handler());
    pool.start();
    let pool = Arc::new(pool);

    let scheduler = Arc::new(WorkerScheduler::new(
        SchedulerConfig::default(),
        pool.clone(),
        aggregator.clone(),
    ));
    let scheduler_handles = scheduler.start();

    let gateway = Arc::new(IngestionGateway::new(
        pool.clone(),
        aggregator.clone(),
        config.gateway.clone(),
    ));
    let state = AppState::new(gateway).with_batch_writer(batch_writer.clone());
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    for handle in scheduler_handles {
        handle.abort();
    }

    // Pool first: its dispatcher still feeds the aggregator and the writer.
    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if let Err(e) = pool.shutdown(timeout).await {
        error!(error = %e, "Worker pool did not stop cleanly");
    }

    if let Err(e) = enricher.close().await {
        warn!(error = %e, "Failed to close enricher");
    }

    if !batch_writer.shutdown(timeout).await {
        error!(stats = ?batch_writer.stats(), "Batch writer did not drain before timeout");
    }

    info!(metrics = ?metrics().snapshot(), "Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // e.g. EDGE_WORKERS__WORKER_COUNT=8
        .add_source(
            config::Environment::with_prefix("EDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
