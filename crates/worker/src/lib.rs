//! Worker side of the ingestion engine.
//!
//! - Pool (bounded job queue, enrichment workers, result dispatch)
//! - Enrichment (geo/network metadata behind the `Enricher` trait)
//! - Sink (batched hand-off of enriched events to persistence)
//! - Scheduler (gauge refresh, metrics log, eviction sweep)

pub mod enrichment;
pub mod pool;
pub mod scheduler;
pub mod sink;

pub use enrichment::{Enricher, EnricherStats, EnrichmentError, GeoRule, NetworkEnricher};
pub use pool::*;
pub use scheduler::*;
pub use sink::*;
