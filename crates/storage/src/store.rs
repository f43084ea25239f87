//! The durable analytics store boundary.
//!
//! The pipeline, aggregator, and metrics store consume this trait; the
//! ClickHouse client implements it. Test doubles implement it in-memory.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use beacon_core::{
    AggregationType, EnrichedEvent, MetricSample, MetricWindow, Result, TopMetric,
};

use crate::client::ClickHouseClient;
use crate::{insert, query};

/// An error event record persisted by the error processor.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub error_type: String,
    pub message: String,
    pub stack_trace: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// JSON metadata blob.
    pub metadata: String,
}

/// A slow-request record persisted by the performance processor.
#[derive(Debug, Clone)]
pub struct SlowRequest {
    pub endpoint: String,
    pub method: String,
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    /// JSON metadata blob.
    pub metadata: String,
}

/// Durable storage operations consumed by the engine core.
///
/// `insert_events` and `insert_metrics` are atomic per batch: a failure
/// means no row of the batch was persisted, so callers can safely
/// re-buffer the whole batch.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Persist a batch of enriched events atomically.
    async fn insert_events(&self, events: &[EnrichedEvent]) -> Result<usize>;

    /// Persist a batch of metric samples atomically.
    async fn insert_metrics(&self, samples: &[MetricSample]) -> Result<usize>;

    /// Persist one error record.
    async fn insert_error(&self, record: ErrorRecord) -> Result<()>;

    /// Persist one slow-request record.
    async fn insert_slow_request(&self, record: SlowRequest) -> Result<()>;

    /// Aggregate event values for one metric over `[start_ms, end_ms)`,
    /// with continuous-percentile support. Empty buckets yield 0.
    async fn aggregate_range(
        &self,
        metric: &str,
        start_ms: i64,
        end_ms: i64,
        aggregation: AggregationType,
        filters: Option<&BTreeMap<String, String>>,
    ) -> Result<f64>;

    /// Windowed aggregates for one metric name.
    async fn metric_window(
        &self,
        name: &str,
        start_ms: i64,
        end_ms: i64,
        window_ms: i64,
    ) -> Result<Vec<MetricWindow>>;

    /// Most active metric names over the last hour.
    async fn top_metrics(&self, limit: u32) -> Result<Vec<TopMetric>>;

    /// Delete metric rows older than the cutoff; returns the matched count.
    async fn delete_metrics_before(&self, cutoff_ms: i64) -> Result<u64>;
}

#[async_trait]
impl AnalyticsStore for ClickHouseClient {
    async fn insert_events(&self, events: &[EnrichedEvent]) -> Result<usize> {
        insert::insert_events(self, events).await
    }

    async fn insert_metrics(&self, samples: &[MetricSample]) -> Result<usize> {
        insert::insert_metrics(self, samples).await
    }

    async fn insert_error(&self, record: ErrorRecord) -> Result<()> {
        insert::insert_error(self, record).await
    }

    async fn insert_slow_request(&self, record: SlowRequest) -> Result<()> {
        insert::insert_slow_request(self, record).await
    }

    async fn aggregate_range(
        &self,
        metric: &str,
        start_ms: i64,
        end_ms: i64,
        aggregation: AggregationType,
        filters: Option<&BTreeMap<String, String>>,
    ) -> Result<f64> {
        query::aggregate_range(self, metric, start_ms, end_ms, aggregation, filters).await
    }

    async fn metric_window(
        &self,
        name: &str,
        start_ms: i64,
        end_ms: i64,
        window_ms: i64,
    ) -> Result<Vec<MetricWindow>> {
        query::metric_window(self, name, start_ms, end_ms, window_ms).await
    }

    async fn top_metrics(&self, limit: u32) -> Result<Vec<TopMetric>> {
        query::top_metrics(self, limit).await
    }

    async fn delete_metrics_before(&self, cutoff_ms: i64) -> Result<u64> {
        query::delete_metrics_before(self, cutoff_ms).await
    }
}
