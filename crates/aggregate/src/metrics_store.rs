//! Buffered metric store with periodic flush and aggregate caching.
//!
//! Samples buffer per metric-name-per-minute key. Two triggers race to
//! flush a key: `store()` flushes synchronously when a buffer hits
//! `max_buffer_size`, and a background task flushes every key on an
//! interval. The buffer swap is atomic under one mutex, so concurrent
//! `store()` calls during a flush land in the fresh buffer and are never
//! lost. A failed persist pushes the captured samples back ahead of
//! anything that arrived since.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use validator::Validate;

use beacon_cache::CacheStore;
use beacon_core::{
    Error, MetricAggregates, MetricKey, MetricSample, MetricWindow, Result, TopMetric,
};
use beacon_storage::AnalyticsStore;
use beacon_telemetry::metrics;

/// Metric store configuration.
#[derive(Debug, Clone)]
pub struct MetricsStoreConfig {
    /// Periodic flush-all interval
    pub flush_interval: Duration,
    /// Per-key buffer size that triggers an immediate flush
    pub max_buffer_size: usize,
    /// TTL on cached per-key aggregates
    pub aggregate_ttl: Duration,
}

impl Default for MetricsStoreConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(5),
            max_buffer_size: 1000,
            aggregate_ttl: Duration::from_secs(86_400),
        }
    }
}

struct Inner {
    store: Arc<dyn AnalyticsStore>,
    cache: Arc<dyn CacheStore>,
    config: MetricsStoreConfig,
    buffers: Mutex<HashMap<MetricKey, Vec<MetricSample>>>,
}

impl Inner {
    /// Flushes one key: swap the buffer out, persist it as one batch,
    /// cache the computed aggregates. On persist failure the captured
    /// samples are restored ahead of newer arrivals and the error is
    /// returned.
    async fn flush(&self, key: &MetricKey) -> Result<()> {
        let Some(captured) = self.buffers.lock().remove(key) else {
            return Ok(());
        };
        if captured.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.store.insert_metrics(&captured).await {
            metrics().metric_flush_failures.inc();
            let mut buffers = self.buffers.lock();
            let buffer = buffers.entry(key.clone()).or_default();
            let mut restored = captured;
            restored.extend(buffer.drain(..));
            *buffer = restored;
            return Err(e);
        }

        metrics().metric_flushes.inc();
        debug!(metric = %key.name, minute = key.minute, count = captured.len(), "Flushed metric buffer");

        let values: Vec<f64> = captured.iter().map(|s| s.value).collect();
        if let Some(aggregates) = MetricAggregates::compute(&values) {
            let payload = serde_json::to_string(&aggregates)?;
            if let Err(e) = self
                .cache
                .set(&key.cache_key(), payload, self.config.aggregate_ttl)
                .await
            {
                warn!(metric = %key.name, error = %e, "Failed to cache metric aggregates");
            }
        }

        Ok(())
    }

    /// Flushes every buffered key, attempting all of them before
    /// surfacing the first error.
    async fn flush_all(&self) -> Result<()> {
        let keys: Vec<MetricKey> = self.buffers.lock().keys().cloned().collect();

        let mut first_err = None;
        for key in keys {
            if let Err(e) = self.flush(&key).await {
                error!(metric = %key.name, error = %e, "Failed to flush metrics");
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

/// Buffered metric store.
pub struct MetricsStore {
    inner: Arc<Inner>,
    shutdown: Arc<Notify>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsStore {
    /// Creates the store and starts its periodic flush task.
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        cache: Arc<dyn CacheStore>,
        config: MetricsStoreConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            store,
            cache,
            config,
            buffers: Mutex::new(HashMap::new()),
        });
        let shutdown = Arc::new(Notify::new());

        let timer = {
            let inner = inner.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(inner.config.flush_interval);
                ticker.tick().await; // first tick completes immediately
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = inner.flush_all().await {
                                error!(error = %e, "Periodic metric flush failed");
                            }
                        }
                        _ = shutdown.notified() => break,
                    }
                }
            })
        };

        Self {
            inner,
            shutdown,
            timer: Mutex::new(Some(timer)),
        }
    }

    /// Buffers one sample, flushing its key synchronously when the buffer
    /// reaches the configured size.
    pub async fn store(&self, sample: MetricSample) -> Result<()> {
        sample.validate().map_err(Error::from)?;
        metrics().samples_buffered.inc();

        let key = MetricKey::of(&sample);
        let should_flush = {
            let mut buffers = self.inner.buffers.lock();
            let buffer = buffers.entry(key.clone()).or_default();
            buffer.push(sample);
            buffer.len() >= self.inner.config.max_buffer_size
        };

        if should_flush {
            self.inner.flush(&key).await?;
        }
        Ok(())
    }

    /// Buffers a batch of samples.
    pub async fn store_batch(&self, samples: Vec<MetricSample>) -> Result<()> {
        for sample in samples {
            self.store(sample).await?;
        }
        Ok(())
    }

    /// Flushes one key immediately.
    pub async fn flush(&self, key: &MetricKey) -> Result<()> {
        self.inner.flush(key).await
    }

    /// Flushes every buffered key.
    pub async fn flush_all(&self) -> Result<()> {
        self.inner.flush_all().await
    }

    /// Total samples currently buffered across all keys.
    pub fn buffer_depth(&self) -> usize {
        self.inner.buffers.lock().values().map(Vec::len).sum()
    }

    /// Windowed aggregates from durable storage. Not part of the hot path.
    pub async fn metric_window(
        &self,
        name: &str,
        start_ms: i64,
        end_ms: i64,
        window_ms: i64,
    ) -> Result<Vec<MetricWindow>> {
        self.inner
            .store
            .metric_window(name, start_ms, end_ms, window_ms)
            .await
    }

    /// Most active metrics over the last hour.
    pub async fn top_metrics(&self, limit: u32) -> Result<Vec<TopMetric>> {
        self.inner.store.top_metrics(limit).await
    }

    /// Deletes samples older than the retention period. Returns the
    /// number of rows matched.
    pub async fn delete_old_metrics(&self, retention_days: i64) -> Result<u64> {
        let cutoff = chrono::Utc::now().timestamp_millis() - retention_days * 86_400_000;
        let deleted = self.inner.store.delete_metrics_before(cutoff).await?;
        info!(deleted, retention_days, "Old metrics deleted");
        Ok(deleted)
    }

    /// Stops the periodic task and performs one final flush-all.
    pub async fn stop(&self) -> Result<()> {
        // notify_one stores a permit, so the signal is not lost if the
        // timer task is mid-flush rather than parked on notified()
        self.shutdown.notify_one();
        if let Some(timer) = self.timer.lock().take() {
            let _ = timer.await;
        }
        self.flush_all().await
    }
}
