//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use telemetry::health;

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health - Full health report.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = health().report();
    let pool = state.gateway.pool();

    Json(HealthResponse {
        status: format!("{:?}", report.status).to_lowercase(),
        queue_depth: pool.queue_len(),
        queue_utilization: pool.queue_utilization(),
        tracked_customers: state.gateway.aggregator().customer_count(),
        components: report.components,
    })
}

/// GET /health/ready - Readiness probe (worker pool accepting jobs).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if health().is_ready() && !state.gateway.pool().is_stopped() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
