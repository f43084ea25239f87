//! Internal metrics collection.
//!
//! Collects engine counters in-memory for logging and observability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the Beacon engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingestion pipeline
    pub events_ingested: Counter,
    pub events_persisted: Counter,
    pub batches_persisted: Counter,
    pub batch_persist_failures: Counter,
    pub processor_failures: Counter,
    pub publish_failures: Counter,

    // Durable queue
    pub messages_enqueued: Counter,
    pub messages_processed: Counter,
    pub messages_retried: Counter,
    pub messages_dead_lettered: Counter,

    // Metric store
    pub samples_buffered: Counter,
    pub metric_flushes: Counter,
    pub metric_flush_failures: Counter,

    // Aggregator
    pub aggregate_cache_hits: Counter,
    pub aggregate_cache_misses: Counter,

    // Latency histograms
    pub batch_flush_latency_ms: Histogram,
    pub aggregate_query_latency_ms: Histogram,

    // Gauges
    pub batch_queue_depth: Gauge,
    pub queue_workers_active: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_ingested: u64,
    pub events_persisted: u64,
    pub batches_persisted: u64,
    pub batch_persist_failures: u64,
    pub processor_failures: u64,
    pub publish_failures: u64,
    pub messages_enqueued: u64,
    pub messages_processed: u64,
    pub messages_retried: u64,
    pub messages_dead_lettered: u64,
    pub samples_buffered: u64,
    pub metric_flushes: u64,
    pub metric_flush_failures: u64,
    pub aggregate_cache_hits: u64,
    pub aggregate_cache_misses: u64,
    pub batch_flush_latency_mean_ms: f64,
    pub aggregate_query_latency_mean_ms: f64,
    pub batch_queue_depth: u64,
    pub queue_workers_active: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_ingested: self.events_ingested.get(),
            events_persisted: self.events_persisted.get(),
            batches_persisted: self.batches_persisted.get(),
            batch_persist_failures: self.batch_persist_failures.get(),
            processor_failures: self.processor_failures.get(),
            publish_failures: self.publish_failures.get(),
            messages_enqueued: self.messages_enqueued.get(),
            messages_processed: self.messages_processed.get(),
            messages_retried: self.messages_retried.get(),
            messages_dead_lettered: self.messages_dead_lettered.get(),
            samples_buffered: self.samples_buffered.get(),
            metric_flushes: self.metric_flushes.get(),
            metric_flush_failures: self.metric_flush_failures.get(),
            aggregate_cache_hits: self.aggregate_cache_hits.get(),
            aggregate_cache_misses: self.aggregate_cache_misses.get(),
            batch_flush_latency_mean_ms: self.batch_flush_latency_ms.mean(),
            aggregate_query_latency_mean_ms: self.aggregate_query_latency_ms.mean(),
            batch_queue_depth: self.batch_queue_depth.get(),
            queue_workers_active: self.queue_workers_active.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
