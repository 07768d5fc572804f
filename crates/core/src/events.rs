//! Log event types for the ingestion engine.
//!
//! A batch arrives as raw JSON, is split into entries, and each entry is
//! deserialized into a [`LogEvent`] and structurally validated. Enrichment
//! later attaches [`GeoInfo`]; the persistence path receives the flattened
//! [`EnrichedEvent`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::error::{Error, Result, ValidationErrorCode};

/// Geographic and network metadata attached by enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn_org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Source address is in a private, loopback, or link-local range
    #[serde(default)]
    pub is_private: bool,
}

impl GeoInfo {
    /// Metadata used for addresses that never leave a private network.
    pub fn private_network() -> Self {
        Self {
            country: Some("Private".to_string()),
            country_code: Some("XX".to_string()),
            city: Some("Private Network".to_string()),
            is_private: true,
            ..Self::default()
        }
    }
}

/// A single CDN/edge request log line.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogEvent {
    /// Owning tenant
    #[serde(alias = "customer_id")]
    #[validate(length(min = 1, max = 128, message = "tenant_id is required"))]
    pub tenant_id: String,
    /// Request time, unix seconds
    #[validate(range(min = 1, message = "timestamp must be positive"))]
    pub timestamp: i64,
    #[validate(range(min = 100, max = 599, message = "status_code must be between 100-599"))]
    pub status_code: i32,
    #[validate(range(min = 0, message = "bytes_sent must be non-negative"))]
    pub bytes_sent: i64,
    /// Client address (IPv4 or IPv6 text form)
    #[validate(length(min = 7, max = 45, message = "invalid ip format"))]
    pub ip: String,
    /// Set by enrichment; never read from the wire
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
}

/// Order in which field failures are reported when several fail at once.
const FIELD_CHECK_ORDER: [&str; 5] = ["timestamp", "tenant_id", "status_code", "bytes_sent", "ip"];

impl LogEvent {
    pub fn new(
        tenant_id: impl Into<String>,
        timestamp: i64,
        status_code: i32,
        bytes_sent: i64,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            timestamp,
            status_code,
            bytes_sent,
            ip: ip.into(),
            geo: None,
        }
    }

    /// Deserialize and validate one raw batch entry.
    ///
    /// `index` is the entry's position in the batch and is carried in the
    /// returned error so callers can point at the offending line.
    pub fn from_entry(index: usize, entry: Value) -> Result<Self> {
        let event: LogEvent = serde_json::from_value(entry)
            .map_err(|e| Error::invalid_entry(index, format!("invalid log entry: {}", e)))?;

        event
            .validate()
            .map_err(|errors| Error::invalid_entry(index, first_failure(&errors)))?;

        Ok(event)
    }

    /// Bytes transferred, clamped to the unsigned counter domain.
    pub fn bytes(&self) -> u64 {
        self.bytes_sent.max(0) as u64
    }
}

/// Pick the first failing field in check order and return its message.
fn first_failure(errors: &ValidationErrors) -> String {
    let mut failures: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            let field = field.to_string();
            errs.first().map(|err| {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field, message)
            })
        })
        .collect();

    failures.sort_by_key(|(field, _)| {
        FIELD_CHECK_ORDER
            .iter()
            .position(|f| *f == field.as_str())
            .unwrap_or(FIELD_CHECK_ORDER.len())
    });

    failures
        .into_iter()
        .next()
        .map(|(_, message)| message)
        .unwrap_or_else(|| "invalid log entry".to_string())
}

/// Raw ingestion payload.
///
/// Accepts either a bare JSON array of entries or `{ "logs": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Array(Vec<Value>),
    Wrapped { logs: Vec<Value> },
}

/// Split a request body into raw, not yet validated entries.
pub fn parse_batch(body: &[u8]) -> Result<Vec<Value>> {
    let payload: RawPayload = serde_json::from_slice(body).map_err(|_| {
        Error::validation(
            ValidationErrorCode::InvalidBody,
            "Request body must be a JSON array of log entries or an object with a 'logs' array",
        )
    })?;

    Ok(match payload {
        RawPayload::Array(entries) => entries,
        RawPayload::Wrapped { logs } => logs,
    })
}

/// Flattened, enriched record handed to the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event_id: String,
    pub tenant_id: String,
    pub timestamp: i64,
    pub status_code: i32,
    pub bytes_sent: u64,
    pub ip: String,
    pub country: String,
    pub country_code: String,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub asn: Option<u32>,
    pub asn_org: Option<String>,
    pub timezone: Option<String>,
    /// Wall-clock time the event left the worker pool, unix millis
    pub ingested_at: i64,
}

impl EnrichedEvent {
    pub fn from_log(event: &LogEvent, tenant_id: &str) -> Self {
        let geo = event.geo.clone().unwrap_or_default();

        Self {
            event_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            timestamp: event.timestamp,
            status_code: event.status_code,
            bytes_sent: event.bytes(),
            ip: event.ip.clone(),
            country: geo.country.unwrap_or_else(|| "unknown".to_string()),
            country_code: geo.country_code.unwrap_or_else(|| "unknown".to_string()),
            city: geo.city,
            latitude: geo.latitude,
            longitude: geo.longitude,
            asn: geo.asn,
            asn_org: geo.asn_org,
            timezone: geo.timezone,
            ingested_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
