//! API routes.

pub mod health;
pub mod ingest;
pub mod metrics;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/logs", post(ingest::ingest_handler))
        .route(
            "/api/v1/customers/:customer_id/metrics",
            get(metrics::customer_metrics_handler),
        )
        .route("/internal/windows", get(metrics::windows_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
