//! Per-tenant sliding-window traffic aggregation.
//!
//! Each tenant owns a fixed ring of minute counters, so memory is bounded by
//! the number of tenants and never by request volume.

pub mod aggregator;
pub mod status;
pub mod window;

pub use aggregator::*;
pub use status::StatusClass;
pub use window::{CustomerWindow, MinuteCounter};
