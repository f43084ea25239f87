//! Mock implementations for testing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use beacon_core::{
    AggregationType, EnrichedEvent, Error, MetricSample, MetricWindow, Result, TopMetric,
};
use beacon_storage::{AnalyticsStore, ErrorRecord, SlowRequest};

/// Mock durable store that captures writes in memory.
///
/// Implements the same `AnalyticsStore` trait as the ClickHouse client,
/// so tests can verify the exact rows the engine would persist without a
/// running database.
#[derive(Default)]
pub struct MockStore {
    events: Mutex<Vec<EnrichedEvent>>,
    metrics: Mutex<Vec<MetricSample>>,
    errors: Mutex<Vec<ErrorRecord>>,
    slow_requests: Mutex<Vec<SlowRequest>>,
    /// Recorded aggregate_range calls: (metric, start_ms, end_ms).
    aggregate_calls: Mutex<Vec<(String, i64, i64)>>,
    /// Value returned for every aggregation bucket.
    aggregate_value: Mutex<f64>,
    /// Simulate failures if set.
    should_fail: Mutex<bool>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    /// Set the value returned for every aggregation bucket.
    pub fn set_aggregate_value(&self, value: f64) {
        *self.aggregate_value.lock() = value;
    }

    pub fn captured_events(&self) -> Vec<EnrichedEvent> {
        self.events.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn captured_metrics(&self) -> Vec<MetricSample> {
        self.metrics.lock().clone()
    }

    pub fn metric_count(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn captured_errors(&self) -> Vec<ErrorRecord> {
        self.errors.lock().clone()
    }

    pub fn captured_slow_requests(&self) -> Vec<SlowRequest> {
        self.slow_requests.lock().clone()
    }

    pub fn aggregate_calls(&self) -> Vec<(String, i64, i64)> {
        self.aggregate_calls.lock().clone()
    }

    fn check_failure(&self) -> Result<()> {
        if *self.should_fail.lock() {
            Err(Error::storage("mock store failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AnalyticsStore for MockStore {
    async fn insert_events(&self, events: &[EnrichedEvent]) -> Result<usize> {
        self.check_failure()?;
        self.events.lock().extend(events.iter().cloned());
        Ok(events.len())
    }

    async fn insert_metrics(&self, samples: &[MetricSample]) -> Result<usize> {
        self.check_failure()?;
        self.metrics.lock().extend(samples.iter().cloned());
        Ok(samples.len())
    }

    async fn insert_error(&self, record: ErrorRecord) -> Result<()> {
        self.check_failure()?;
        self.errors.lock().push(record);
        Ok(())
    }

    async fn insert_slow_request(&self, record: SlowRequest) -> Result<()> {
        self.check_failure()?;
        self.slow_requests.lock().push(record);
        Ok(())
    }

    async fn aggregate_range(
        &self,
        metric: &str,
        start_ms: i64,
        end_ms: i64,
        _aggregation: AggregationType,
        _filters: Option<&BTreeMap<String, String>>,
    ) -> Result<f64> {
        self.check_failure()?;
        self.aggregate_calls
            .lock()
            .push((metric.to_string(), start_ms, end_ms));
        Ok(*self.aggregate_value.lock())
    }

    async fn metric_window(
        &self,
        _name: &str,
        _start_ms: i64,
        _end_ms: i64,
        _window_ms: i64,
    ) -> Result<Vec<MetricWindow>> {
        self.check_failure()?;
        Ok(Vec::new())
    }

    async fn top_metrics(&self, _limit: u32) -> Result<Vec<TopMetric>> {
        self.check_failure()?;
        Ok(Vec::new())
    }

    async fn delete_metrics_before(&self, cutoff_ms: i64) -> Result<u64> {
        self.check_failure()?;
        let mut metrics = self.metrics.lock();
        let before = metrics.len();
        metrics.retain(|s| s.timestamp >= cutoff_ms);
        Ok((before - metrics.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn mock_store_captures_events() {
        let mock = MockStore::new();
        let event = fixtures::enriched(fixtures::pageview());

        let inserted = mock.insert_events(&[event]).await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(mock.event_count(), 1);
    }

    #[tokio::test]
    async fn mock_store_failure_mode() {
        let mock = MockStore::new();
        mock.set_should_fail(true);

        let result = mock.insert_events(&[]).await;
        assert!(result.is_err());
        assert_eq!(mock.event_count(), 0);
    }
}
