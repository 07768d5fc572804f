//! Process-local telemetry for the edge analytics engine.
//!
//! Counters, gauges and latency histograms live in a global registry that
//! the HTTP layer serves as JSON; component health feeds the readiness probe.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
