//! Unified error types for the ingestion engine.
//!
//! Error codes are the machine-readable `error` field of HTTP error bodies:
//! - `empty_batch`, `batch_too_large`, `invalid_request_body`,
//!   `validation_failed`: caller-fixable input errors (400)
//! - `rate_limited`: overload / backpressure (429)
//! - `service_unavailable`: ingestion pipeline is shutting down (503)
//! - `internal_error`: anything unexpected (500)

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// Batch contains no entries
    EmptyBatch,
    /// Batch exceeds 1000 entries or the payload byte limit
    BatchTooLarge,
    /// Body is not a JSON array / `{ "logs": [...] }` object
    InvalidBody,
    /// An entry is missing a field or fails a structural check
    SchemaInvalid,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyBatch => "empty_batch",
            Self::BatchTooLarge => "batch_too_large",
            Self::InvalidBody => "invalid_request_body",
            Self::SchemaInvalid => "validation_failed",
        }
    }
}

/// Unified error type for the ingestion engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Batch or entry rejected before any work was enqueued.
    #[error("[{code}] {message}")]
    Validation {
        code: &'static str,
        message: String,
        /// Index of the first offending entry, for per-entry failures.
        log_index: Option<usize>,
    },

    /// Worker queue is saturated; the caller should retry later.
    #[error("overloaded: buffer utilization {utilization:.2}")]
    Overloaded { utilization: f64, retry_after: u64 },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a batch-level validation error.
    pub fn validation(code: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::Validation {
            code: code.code(),
            message: msg.into(),
            log_index: None,
        }
    }

    /// Create a per-entry validation error.
    pub fn invalid_entry(index: usize, msg: impl Into<String>) -> Self {
        Self::Validation {
            code: ValidationErrorCode::SchemaInvalid.code(),
            message: msg.into(),
            log_index: Some(index),
        }
    }

    pub fn overloaded(utilization: f64, retry_after: u64) -> Self {
        Self::Overloaded {
            utilization,
            retry_after,
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Serialization(_) => 400,
            Self::Overloaded { .. } => 429,
            Self::Unavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Get the machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. } => code,
            Self::Serialization(_) => ValidationErrorCode::InvalidBody.code(),
            Self::Overloaded { .. } => "rate_limited",
            Self::Unavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller should back off and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Overloaded { .. } | Self::Unavailable(_))
    }
}
