//! Component health aggregation for liveness and readiness probes.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

/// Health flag for one component.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    healthy: AtomicBool,
    message: parking_lot::RwLock<Option<String>>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            healthy: AtomicBool::new(false),
            message: parking_lot::RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.message.read().clone()
    }

    fn report(&self) -> ComponentHealthReport {
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: self.is_healthy(),
            message: self.message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Health of the engine's moving parts.
///
/// Readiness depends only on the worker pool: enrichment and the sink can
/// fail without stopping ingestion.
pub struct HealthRegistry {
    pub worker_pool: ComponentHealth,
    pub enrichment: ComponentHealth,
    pub sink: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            worker_pool: ComponentHealth::new("worker_pool"),
            enrichment: ComponentHealth::new("enrichment"),
            sink: ComponentHealth::new("sink"),
        }
    }

    pub fn report(&self) -> HealthReport {
        let components = vec![
            self.worker_pool.report(),
            self.enrichment.report(),
            self.sink.report(),
        ];

        let status = if !self.worker_pool.is_healthy() {
            HealthStatus::Unhealthy
        } else if components.iter().all(|c| c.healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthReport { status, components }
    }

    /// Check if the service can accept traffic.
    pub fn is_ready(&self) -> bool {
        self.worker_pool.is_healthy()
    }

    pub fn is_alive(&self) -> bool {
        true
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global health registry.
pub static HEALTH: std::sync::LazyLock<HealthRegistry> =
    std::sync::LazyLock::new(HealthRegistry::new);

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
