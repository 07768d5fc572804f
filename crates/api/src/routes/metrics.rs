//! Query endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use telemetry::{metrics, MetricsSnapshot};
use window_aggregator::{AggregatorStats, QueryResult};
use worker::{BatchWriterStats, PoolStats};

use crate::state::AppState;

/// `?minutes=` is taken as a raw string so bad values fall back to the
/// default window instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub minutes: Option<String>,
}

/// GET /api/v1/customers/:customer_id/metrics
pub async fn customer_metrics_handler(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Json<QueryResult> {
    let minutes = state.gateway.resolve_minutes(query.minutes.as_deref());
    Json(state.gateway.summary(&customer_id, minutes))
}

/// GET /internal/windows
pub async fn windows_handler(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Json<HashMap<String, QueryResult>> {
    let minutes = state.gateway.resolve_minutes(query.minutes.as_deref());
    Json(state.gateway.snapshot(minutes))
}

/// Engine-wide operational metrics.
#[derive(Debug, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub uptime_secs: u64,
    pub telemetry: MetricsSnapshot,
    pub worker_pool: PoolStats,
    pub aggregator: AggregatorStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<BatchWriterStats>,
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<EngineMetrics> {
    let pool = state.gateway.pool().stats();
    let aggregator = state.gateway.aggregator_stats();

    metrics().queue_depth.set(pool.queue_len as u64);
    metrics().tracked_tenants.set(aggregator.tracked_customers as u64);

    Json(EngineMetrics {
        uptime_secs: state.started_at.elapsed().as_secs(),
        telemetry: metrics().snapshot(),
        worker_pool: pool,
        aggregator,
        sink: state.batch_writer.as_ref().map(|w| w.stats()),
    })
}
