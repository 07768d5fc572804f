//! Log ingestion endpoint.
//!
//! Accepts a JSON array of log entries or `{ "logs": [...] }`.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::StatusCode,
    Json,
};
use analytics_core::{limits::MAX_BATCH_SIZE_BYTES, Error, ValidationErrorCode};
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info};

use crate::extractors::ClientIp;
use crate::response::{ApiError, IngestResponse};
use crate::state::AppState;

/// POST /api/v1/logs
pub async fn ingest_handler(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    body: Body,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let start = Instant::now();

    let body = to_bytes(body, MAX_BATCH_SIZE_BYTES).await.map_err(|_| {
        metrics().batches_received.inc();
        Error::validation(
            ValidationErrorCode::BatchTooLarge,
            format!("Payload exceeds {}KB limit", MAX_BATCH_SIZE_BYTES / 1024),
        )
    })?;

    debug!(
        payload_size = body.len(),
        client_ip = client_ip.as_deref().unwrap_or("unknown"),
        "Received log batch"
    );

    let accepted = state.gateway.accept_body(&body)?;

    let latency_ms = start.elapsed().as_millis() as u64;
    metrics().ingest_latency_ms.observe(latency_ms);

    info!(
        accepted = accepted.accepted,
        buffer_utilization = accepted.buffer_utilization,
        latency_ms = latency_ms,
        "Batch accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse::accepted(accepted.accepted, accepted.buffer_utilization)),
    ))
}
