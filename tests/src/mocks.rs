//! Mock implementations for testing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analytics_core::{EnrichedEvent, GeoInfo, LogEvent, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use worker::{Enricher, EnrichmentError, EventSink};

/// Enricher that stamps a fixed location on every event.
///
/// Can be told to fail, to add latency, or to hold every call until
/// [`release`](MockEnricher::release) so tests can fill the job queue.
pub struct MockEnricher {
    geo: GeoInfo,
    should_fail: Arc<Mutex<bool>>,
    delay: Arc<Mutex<Option<Duration>>>,
    gate: watch::Sender<bool>,
    calls: AtomicU64,
}

impl MockEnricher {
    pub fn new() -> Self {
        Self {
            geo: GeoInfo {
                country: Some("United States".to_string()),
                country_code: Some("US".to_string()),
                city: Some("Ashburn".to_string()),
                asn: Some(64_500),
                ..GeoInfo::default()
            },
            should_fail: Arc::new(Mutex::new(false)),
            delay: Arc::new(Mutex::new(None)),
            gate: watch::channel(true).0,
            calls: AtomicU64::new(0),
        }
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Blocks every subsequent `enrich` call until `release`.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for MockEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Enricher for MockEnricher {
    async fn enrich(&self, event: &mut LogEvent) -> std::result::Result<(), EnrichmentError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(EnrichmentError::Closed);
        }

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.should_fail.lock() {
            return Err(EnrichmentError::Lookup("mock enricher failure".to_string()));
        }

        event.geo = Some(self.geo.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Sink that keeps every written event in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<EnrichedEvent>>>,
    batches: Arc<Mutex<usize>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all written events.
    pub fn written_events(&self) -> Vec<EnrichedEvent> {
        self.events.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn batch_count(&self) -> usize {
        *self.batches.lock()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn write_batch(&self, events: Vec<EnrichedEvent>) -> Result<usize> {
        if *self.should_fail.lock() {
            return Err(analytics_core::Error::internal("Mock sink failure"));
        }

        let count = events.len();
        self.events.lock().extend(events);
        *self.batches.lock() += 1;
        Ok(count)
    }

    fn is_healthy(&self) -> bool {
        !*self.should_fail.lock()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_enricher_sets_geo() {
        let mock = MockEnricher::new();
        let mut event = LogEvent::new("t", 1, 200, 10, "203.0.113.9");

        mock.enrich(&mut event).await.unwrap();
        assert_eq!(event.geo.unwrap().country_code.as_deref(), Some("US"));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_enricher_failure_mode() {
        let mock = MockEnricher::new();
        mock.set_should_fail(true);

        let mut event = LogEvent::new("t", 1, 200, 10, "203.0.113.9");
        assert!(mock.enrich(&mut event).await.is_err());
        assert!(event.geo.is_none());
    }

    #[tokio::test]
    async fn test_mock_enricher_hold_and_release() {
        let mock = Arc::new(MockEnricher::new());
        mock.hold();

        let task = {
            let mock = mock.clone();
            tokio::spawn(async move {
                let mut event = LogEvent::new("t", 1, 200, 10, "203.0.113.9");
                mock.enrich(&mut event).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        mock.release();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_memory_sink_captures_and_fails() {
        let sink = MemorySink::new();
        let event = EnrichedEvent::from_log(&LogEvent::new("t", 1, 200, 10, "10.0.0.1"), "t");

        assert_eq!(sink.write_batch(vec![event.clone()]).await.unwrap(), 1);
        assert_eq!(sink.event_count(), 1);
        assert_eq!(sink.batch_count(), 1);

        sink.set_should_fail(true);
        assert!(sink.write_batch(vec![event]).await.is_err());
        assert!(!sink.is_healthy());
        assert_eq!(sink.event_count(), 1);
    }
}
