//! Geographic/network enrichment of log events.
//!
//! Enrichment sits behind the [`Enricher`] trait so the pool never depends on
//! a particular lookup backend. [`NetworkEnricher`] resolves addresses
//! against a static table of CIDR rules; private and loopback ranges short
//! circuit to [`GeoInfo::private_network`].

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use analytics_core::{GeoInfo, LogEvent};
use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Enrichment failures. None of these are fatal to event processing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrichmentError {
    #[error("invalid ip address: {0}")]
    InvalidIp(String),

    #[error("no geo data for {0}")]
    NotFound(String),

    #[error("enricher is closed")]
    Closed,

    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// Attaches [`GeoInfo`] to events.
///
/// Implementations must be safe to call from every pool worker at once.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Sets `event.geo` on success and leaves the event untouched on error.
    async fn enrich(&self, event: &mut LogEvent) -> Result<(), EnrichmentError>;

    /// Releases backend resources. Later `enrich` calls fail with `Closed`.
    async fn close(&self) -> Result<(), EnrichmentError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// One row of the network lookup table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoRule {
    pub cidr: IpNet,
    pub country: String,
    pub country_code: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub asn: Option<u32>,
    #[serde(default)]
    pub asn_org: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl GeoRule {
    fn to_geo(&self) -> GeoInfo {
        GeoInfo {
            country: Some(self.country.clone()),
            country_code: Some(self.country_code.clone()),
            city: self.city.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            asn: self.asn,
            asn_org: self.asn_org.clone(),
            timezone: self.timezone.clone(),
            is_private: false,
        }
    }
}

/// Table-driven enricher.
///
/// Rules are matched longest-prefix first, so a /24 override wins over the
/// /8 it sits inside.
pub struct NetworkEnricher {
    rules: Vec<GeoRule>,
    closed: AtomicBool,
    enrichments: AtomicU64,
    errors: AtomicU64,
}

/// Lookup counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnricherStats {
    pub enrichments: u64,
    pub errors: u64,
}

impl NetworkEnricher {
    pub fn new(mut rules: Vec<GeoRule>) -> Self {
        rules.sort_by(|a, b| b.cidr.prefix_len().cmp(&a.cidr.prefix_len()));
        info!(rules = rules.len(), "Network enricher initialized");

        Self {
            rules,
            closed: AtomicBool::new(false),
            enrichments: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> EnricherStats {
        EnricherStats {
            enrichments: self.enrichments.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Resolve an address without touching an event.
    pub fn lookup(&self, ip: &str) -> Result<GeoInfo, EnrichmentError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EnrichmentError::Closed);
        }

        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| EnrichmentError::InvalidIp(ip.to_string()))?;

        if is_private(&addr) {
            return Ok(GeoInfo::private_network());
        }

        self.rules
            .iter()
            .find(|rule| rule.cidr.contains(&addr))
            .map(GeoRule::to_geo)
            .ok_or_else(|| EnrichmentError::NotFound(ip.to_string()))
    }
}

impl Default for NetworkEnricher {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Enricher for NetworkEnricher {
    async fn enrich(&self, event: &mut LogEvent) -> Result<(), EnrichmentError> {
        match self.lookup(&event.ip) {
            Ok(geo) => {
                self.enrichments.fetch_add(1, Ordering::Relaxed);
                event.geo = Some(geo);
                Ok(())
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<(), EnrichmentError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(stats = ?self.stats(), "Network enricher closed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "network"
    }
}

/// Private, loopback, link-local and unique-local ranges.
fn is_private(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || (first & 0xfe00) == 0xfc00 // fc00::/7
                || (first & 0xffc0) == 0xfe80 // fe80::/10
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private(&IpAddr::V4(v4)))
        }
    }
}
