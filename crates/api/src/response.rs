//! HTTP response bodies and error mapping.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use telemetry::ComponentHealthReport;

/// 202 body for an admitted batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub message: String,
    pub buffer_utilization: f64,
}

impl IngestResponse {
    pub fn accepted(accepted: usize, buffer_utilization: f64) -> Self {
        Self {
            accepted,
            message: "logs queued for processing".to_string(),
            buffer_utilization,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub queue_depth: usize,
    pub queue_utilization: f64,
    pub tracked_customers: usize,
    pub components: Vec<ComponentHealthReport>,
}

/// Error body. Optional fields are omitted when not relevant to the error.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            log_index: None,
            retry_after: None,
            utilization: None,
        }
    }
}

/// API error: status, body, and optional `Retry-After` header.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(code, msg),
            retry_after: None,
        }
    }

    pub fn bad_request(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, code, msg)
    }

    pub fn rate_limited(utilization: f64, retry_after: u64) -> Self {
        let mut response = ErrorResponse::new(
            "rate_limited",
            "Server is under high load. Please retry after specified seconds.",
        );
        response.retry_after = Some(retry_after);
        response.utilization = Some(utilization);

        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            response,
            retry_after: Some(retry_after),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.response)).into_response();

        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<analytics_core::Error> for ApiError {
    fn from(err: analytics_core::Error) -> Self {
        use analytics_core::Error;

        match err {
            Error::Validation {
                code,
                message,
                log_index,
            } => {
                let mut api = ApiError::bad_request(code, message);
                api.response.log_index = log_index;
                api
            }
            Error::Overloaded {
                utilization,
                retry_after,
            } => ApiError::rate_limited(utilization, retry_after),
            Error::Unavailable(msg) => ApiError::unavailable(msg),
            err @ Error::Serialization(_) => ApiError::bad_request(err.error_code(), err.to_string()),
            Error::Internal(msg) => ApiError::internal(msg),
        }
    }
}
