//! Aggregation service: realtime window pool and cached historical
//! bucket aggregation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use beacon_cache::CacheStore;
use beacon_core::{
    AggregationQuery, AggregationResult, Error, Interval, RealtimeStats, Result,
};
use beacon_storage::AnalyticsStore;
use beacon_telemetry::metrics;

use crate::window::SlidingWindow;

/// TTL on cached historical aggregation results.
const AGGREGATE_CACHE_TTL: Duration = Duration::from_secs(60);
/// Expiry on the per-metric realtime stream.
const REALTIME_STREAM_TTL: Duration = Duration::from_secs(3600);

/// Answers historical bucketed-aggregation queries with result caching
/// and exposes live statistics backed by one sliding window per
/// supported interval.
pub struct AggregatorService {
    windows: HashMap<Interval, SlidingWindow>,
    store: Arc<dyn AnalyticsStore>,
    cache: Arc<dyn CacheStore>,
}

impl AggregatorService {
    pub fn new(store: Arc<dyn AnalyticsStore>, cache: Arc<dyn CacheStore>) -> Self {
        let windows = Interval::ALL
            .iter()
            .map(|i| (*i, SlidingWindow::new(i.duration_ms())))
            .collect();

        Self {
            windows,
            store,
            cache,
        }
    }

    /// Feeds one raw value into *every* interval window (fan-out, not
    /// selection) and appends a durable timestamped entry to the metric's
    /// realtime stream, so realtime stats reflect the same stream at
    /// every granularity.
    pub async fn add_realtime_metric(&self, metric: &str, value: f64) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        for window in self.windows.values() {
            window.add_at(value, now);
        }

        let key = format!("realtime:{}", metric);
        let entry = serde_json::json!({ "value": value, "timestamp": now }).to_string();
        self.cache.sorted_add(&key, now as f64, entry).await?;
        self.cache.expire(&key, REALTIME_STREAM_TTL).await?;

        Ok(())
    }

    /// Live statistics for one interval window. Unknown interval keys are
    /// an `InvalidInterval` error.
    pub fn realtime_stats(&self, metric: &str, interval: &str) -> Result<RealtimeStats> {
        let interval: Interval = interval.parse()?;
        let window = self
            .windows
            .get(&interval)
            .ok_or_else(|| Error::InvalidInterval(interval.as_str().to_string()))?;

        Ok(RealtimeStats {
            metric: metric.to_string(),
            interval,
            timestamp: Utc::now(),
            stats: window.stats(),
        })
    }

    /// Historical aggregation with a short-TTL result cache keyed by the
    /// exact query parameters. Two identical queries within the TTL
    /// return the same rows from one storage pass.
    pub async fn aggregate(&self, query: &AggregationQuery) -> Result<Vec<AggregationResult>> {
        let cache_key = query.cache_key();

        if let Some(cached) = self.cache.get(&cache_key).await? {
            match serde_json::from_str(&cached) {
                Ok(results) => {
                    metrics().aggregate_cache_hits.inc();
                    debug!(metric = %query.metric, "Aggregation cache hit");
                    return Ok(results);
                }
                Err(e) => warn!(error = %e, "Discarding malformed cached aggregation"),
            }
        }

        metrics().aggregate_cache_misses.inc();
        let started = Instant::now();
        let results = self.run_aggregation(query).await?;
        metrics()
            .aggregate_query_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        let payload = serde_json::to_string(&results)?;
        if let Err(e) = self.cache.set(&cache_key, payload, AGGREGATE_CACHE_TTL).await {
            warn!(error = %e, "Failed to cache aggregation result");
        }

        Ok(results)
    }

    /// Partitions `[start, end)` into interval-sized buckets (the last
    /// may be shorter) and runs one storage aggregation per bucket.
    async fn run_aggregation(&self, query: &AggregationQuery) -> Result<Vec<AggregationResult>> {
        let start = query.start_time.timestamp_millis();
        let end = query.end_time.timestamp_millis();
        let interval_ms = query.interval.duration_ms();
        let filters = query.filters.as_ref();

        let mut results = Vec::new();
        let mut bucket_start = start;

        while bucket_start < end {
            let bucket_end = (bucket_start + interval_ms).min(end);

            let value = self
                .store
                .aggregate_range(&query.metric, bucket_start, bucket_end, query.aggregation, filters)
                .await?;

            let timestamp = DateTime::<Utc>::from_timestamp_millis(bucket_start)
                .ok_or_else(|| Error::internal("bucket timestamp out of range"))?
                .to_rfc3339_opts(SecondsFormat::Millis, true);

            results.push(AggregationResult {
                timestamp,
                value,
                metric: query.metric.clone(),
                aggregation: query.aggregation.as_str().to_string(),
            });

            bucket_start += interval_ms;
        }

        Ok(results)
    }
}
