//! Performance-event processor.
//!
//! Tracks per-endpoint latency counters in the cache and persists a
//! durable row for requests over the slow threshold.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use beacon_cache::CacheStore;
use beacon_core::{EnrichedEvent, EventType, Result};
use beacon_storage::{AnalyticsStore, SlowRequest};

use super::Processor;

/// Requests slower than this are persisted individually.
const SLOW_REQUEST_THRESHOLD_MS: f64 = 1000.0;

/// Expiry on per-endpoint counters.
const PERF_COUNTER_TTL: Duration = Duration::from_secs(86_400);

pub struct PerformanceProcessor {
    store: Arc<dyn AnalyticsStore>,
    cache: Arc<dyn CacheStore>,
}

impl PerformanceProcessor {
    pub fn new(store: Arc<dyn AnalyticsStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self { store, cache }
    }
}

#[async_trait]
impl Processor for PerformanceProcessor {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn should_process(&self, event: &EnrichedEvent) -> bool {
        event.event_type == EventType::ApiCall && event.duration.is_some()
    }

    async fn process(&self, event: &EnrichedEvent) -> Result<()> {
        let Some(duration) = event.duration else {
            return Ok(());
        };

        let endpoint = event.metadata_str("endpoint").unwrap_or("unknown").to_string();
        let method = event.metadata_str("method").unwrap_or("GET").to_string();
        let status_code = event.metadata_f64("statusCode").unwrap_or(200.0) as u16;

        let key = format!("perf:{}:{}", endpoint, method);
        self.cache.hash_incr(&key, "count", 1.0).await?;
        self.cache.hash_incr(&key, "total_duration", duration).await?;
        if status_code >= 500 {
            self.cache.hash_incr(&key, "errors", 1.0).await?;
        }
        self.cache.expire(&key, PERF_COUNTER_TTL).await?;

        if duration > SLOW_REQUEST_THRESHOLD_MS {
            self.store
                .insert_slow_request(SlowRequest {
                    endpoint,
                    method,
                    duration,
                    timestamp: event.timestamp,
                    user_id: event.user_id.clone(),
                    metadata: serde_json::Value::Object(event.metadata.clone()).to_string(),
                })
                .await?;
        }

        Ok(())
    }
}
