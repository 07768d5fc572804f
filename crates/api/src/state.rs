//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use worker::BatchWriter;

use crate::gateway::IngestionGateway;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<IngestionGateway>,
    /// Present when enriched events are being persisted
    pub batch_writer: Option<Arc<BatchWriter>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(gateway: Arc<IngestionGateway>) -> Self {
        Self {
            gateway,
            batch_writer: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_batch_writer(mut self, writer: Arc<BatchWriter>) -> Self {
        self.batch_writer = Some(writer);
        self
    }
}
