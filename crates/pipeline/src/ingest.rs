//! Ingestion pipeline orchestrator.
//!
//! `process_event` validates and enriches each event and hands it to the
//! batch processor. The injected sink persists each captured batch
//! atomically, runs the processor plugins per event with isolated
//! failures, then (post-commit, best-effort) bumps rolling daily
//! counters and publishes one live update per event.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};
use validator::Validate;

use beacon_cache::CacheStore;
use beacon_core::{EnrichedEvent, Error, Event, Result};
use beacon_storage::AnalyticsStore;
use beacon_telemetry::metrics;

use crate::batch::{BatchProcessor, BatchSink};
use crate::processors::Processor;

/// Channel carrying one JSON message per ingested event.
pub const REALTIME_CHANNEL: &str = "events:realtime";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Batch size that triggers a synchronous flush
    pub batch_size: usize,
    /// Timer flush interval
    pub flush_interval: Duration,
    /// Server identity stamped into event metadata at enrichment
    pub server_id: String,
    /// Retention on rolling daily counters
    pub counter_retention: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            server_id: "unknown".to_string(),
            counter_retention: Duration::from_secs(7 * 86_400),
        }
    }
}

/// Observability snapshot of the underlying batch processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub queue_size: usize,
    pub is_processing: bool,
}

/// The ingestion orchestrator.
pub struct IngestionPipeline {
    batch: BatchProcessor<EnrichedEvent>,
    server_id: String,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        cache: Arc<dyn CacheStore>,
        processors: Vec<Arc<dyn Processor>>,
        config: PipelineConfig,
    ) -> Self {
        let sink = Arc::new(EventBatchSink {
            store,
            cache,
            processors,
            counter_retention: config.counter_retention,
        });
        let batch = BatchProcessor::new(config.batch_size, config.flush_interval, sink);

        Self {
            batch,
            server_id: config.server_id,
        }
    }

    /// Validates, enriches, and batches one event. The event may be
    /// flushed synchronously if it fills the batch.
    pub async fn process_event(&self, event: Event) -> Result<()> {
        event.validate().map_err(Error::from)?;

        let enriched = EnrichedEvent::enrich(event, &self.server_id);
        metrics().events_ingested.inc();
        self.batch.add(enriched).await
    }

    /// Processes a batch of events in order.
    pub async fn process_events(&self, events: Vec<Event>) -> Result<()> {
        for event in events {
            self.process_event(event).await?;
        }
        Ok(())
    }

    /// Flushes any buffered events immediately.
    pub async fn flush(&self) -> Result<()> {
        self.batch.flush().await
    }

    /// Buffer depth and flush state of the batch processor.
    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            queue_size: self.batch.queue_size(),
            is_processing: self.batch.is_processing(),
        }
    }

    /// Stops the flush timer and drains the buffer.
    pub async fn shutdown(&self) -> Result<()> {
        self.batch.stop().await
    }
}

/// Batch sink: persist, process, then count and publish.
struct EventBatchSink {
    store: Arc<dyn AnalyticsStore>,
    cache: Arc<dyn CacheStore>,
    processors: Vec<Arc<dyn Processor>>,
    counter_retention: Duration,
}

impl EventBatchSink {
    /// Rolling per-type daily counters under `metrics:{type}:{date}`.
    async fn update_rolling_counters(&self, event: &EnrichedEvent) -> Result<()> {
        let key = format!("metrics:{}:{}", event.event_type.as_str(), event.day_key());

        self.cache.hash_incr(&key, "count", 1.0).await?;
        if let Some(value) = event.value {
            self.cache.hash_incr(&key, "value_sum", value).await?;
        }
        if let Some(duration) = event.duration {
            self.cache.hash_incr(&key, "duration_sum", duration).await?;
            self.cache.hash_incr(&key, "duration_count", 1.0).await?;
        }
        self.cache.expire(&key, self.counter_retention).await?;

        Ok(())
    }

    async fn publish_live_update(&self, event: &EnrichedEvent) -> Result<()> {
        let payload = json!({
            "type": "event",
            "data": event,
            "timestamp": Utc::now().timestamp_millis(),
        })
        .to_string();

        self.cache.publish(REALTIME_CHANNEL, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl BatchSink<EnrichedEvent> for EventBatchSink {
    async fn process(&self, batch: &[EnrichedEvent]) -> Result<()> {
        // Atomic batch commit; a failure re-buffers the whole batch
        match self.store.insert_events(batch).await {
            Ok(count) => {
                metrics().batches_persisted.inc();
                metrics().events_persisted.inc_by(count as u64);
            }
            Err(e) => {
                metrics().batch_persist_failures.inc();
                return Err(e);
            }
        }

        debug!(count = batch.len(), "Persisted event batch");

        // Processor plugins, in registration order, failures isolated
        for event in batch {
            for processor in &self.processors {
                if !processor.should_process(event) {
                    continue;
                }
                if let Err(e) = processor.process(event).await {
                    metrics().processor_failures.inc();
                    warn!(
                        processor = processor.name(),
                        error = %e,
                        "Processor failed; continuing"
                    );
                }
            }
        }

        // Post-commit, best-effort: counters and live updates never roll
        // back the durable commit
        for event in batch {
            if let Err(e) = self.update_rolling_counters(event).await {
                warn!(error = %e, "Failed to update rolling counters");
            }
            if let Err(e) = self.publish_live_update(event).await {
                metrics().publish_failures.inc();
                warn!(error = %e, "Failed to publish live update");
            }
        }

        Ok(())
    }
}
