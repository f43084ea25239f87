//! Error-event processor.
//!
//! Tracks per-type error counters in the cache, persists a durable error
//! row, and publishes critical errors on the alert channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use beacon_cache::CacheStore;
use beacon_core::{EnrichedEvent, EventType, Result};
use beacon_storage::{AnalyticsStore, ErrorRecord};

use super::Processor;

/// Channel for critical error alerts.
pub const CRITICAL_ALERT_CHANNEL: &str = "alerts:critical";

/// Error types that trigger a critical alert publish.
const CRITICAL_ERROR_TYPES: [&str; 3] = ["DATABASE_ERROR", "AUTH_FAILURE", "PAYMENT_ERROR"];

/// Expiry on per-error-type counters.
const ERROR_COUNTER_TTL: Duration = Duration::from_secs(7 * 86_400);
/// Expiry on hourly error counters.
const HOURLY_COUNTER_TTL: Duration = Duration::from_secs(86_400);

pub struct ErrorProcessor {
    store: Arc<dyn AnalyticsStore>,
    cache: Arc<dyn CacheStore>,
}

impl ErrorProcessor {
    pub fn new(store: Arc<dyn AnalyticsStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self { store, cache }
    }

    async fn update_error_counters(&self, error_type: &str, event: &EnrichedEvent) -> Result<()> {
        let key = format!("errors:{}", error_type);
        let hour_key = format!(
            "errors:hourly:{}",
            event.timestamp.format("%Y-%m-%dT%H")
        );

        self.cache.hash_incr(&key, "count", 1.0).await?;
        self.cache.expire(&key, ERROR_COUNTER_TTL).await?;

        self.cache.hash_incr(&hour_key, error_type, 1.0).await?;
        self.cache.expire(&hour_key, HOURLY_COUNTER_TTL).await?;

        Ok(())
    }

    async fn alert_critical(&self, event: &EnrichedEvent) -> Result<()> {
        let payload = json!({
            "type": "critical_error",
            "event": event,
            "timestamp": Utc::now().timestamp_millis(),
            "severity": "high",
        })
        .to_string();

        self.cache.publish(CRITICAL_ALERT_CHANNEL, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl Processor for ErrorProcessor {
    fn name(&self) -> &'static str {
        "error"
    }

    fn should_process(&self, event: &EnrichedEvent) -> bool {
        event.event_type == EventType::Error
    }

    async fn process(&self, event: &EnrichedEvent) -> Result<()> {
        let error_type = event.metadata_str("errorType").unwrap_or("unknown").to_string();
        let message = event.metadata_str("message").unwrap_or_default().to_string();
        let stack_trace = event
            .metadata_str("stackTrace")
            .unwrap_or_default()
            .to_string();

        self.update_error_counters(&error_type, event).await?;

        self.store
            .insert_error(ErrorRecord {
                error_type: error_type.clone(),
                message,
                stack_trace,
                timestamp: event.timestamp,
                user_id: event.user_id.clone(),
                session_id: event.session_id.clone(),
                metadata: serde_json::Value::Object(event.metadata.clone()).to_string(),
            })
            .await?;

        if CRITICAL_ERROR_TYPES.contains(&error_type.as_str()) {
            self.alert_critical(event).await?;
        }

        Ok(())
    }
}
