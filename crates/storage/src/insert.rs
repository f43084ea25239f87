//! Batch insert helpers for ClickHouse.
//!
//! A single insert block is the atomic commit unit: either every row in
//! the batch lands or none does. The batching layers above rely on that
//! when they re-buffer a failed batch.

use clickhouse::Row;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use beacon_core::{EnrichedEvent, Error, MetricSample, Result};

use crate::client::ClickHouseClient;
use crate::store::{ErrorRecord, SlowRequest};

/// Flattened event row for ClickHouse insertion.
#[derive(Debug, Clone, Row, Serialize)]
pub struct EventRow {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Milliseconds since epoch, lands in DateTime64(3)
    pub timestamp: i64,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: String,
    pub tags: Vec<String>,
    pub value: Option<f64>,
    pub duration: Option<f64>,
}

impl From<&EnrichedEvent> for EventRow {
    fn from(event: &EnrichedEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event.event_type.as_str().to_string(),
            timestamp: event.timestamp.timestamp_millis(),
            user_id: event.user_id.clone(),
            session_id: event.session_id.clone(),
            metadata: serde_json::Value::Object(event.metadata.clone()).to_string(),
            tags: event.tags.clone(),
            value: event.value,
            duration: event.duration,
        }
    }
}

/// Raw metric sample row.
#[derive(Debug, Clone, Row, Serialize)]
pub struct MetricRow {
    pub name: String,
    pub value: f64,
    pub timestamp: i64,
    pub tags: String,
    pub aggregation_type: String,
}

impl From<&MetricSample> for MetricRow {
    fn from(sample: &MetricSample) -> Self {
        Self {
            name: sample.name.clone(),
            value: sample.value,
            timestamp: sample.timestamp,
            tags: serde_json::to_string(&sample.tags).unwrap_or_else(|_| "{}".to_string()),
            aggregation_type: "raw".to_string(),
        }
    }
}

#[derive(Debug, Clone, Row, Serialize)]
pub struct ErrorRow {
    pub error_type: String,
    pub message: String,
    pub stack_trace: String,
    pub timestamp: i64,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: String,
}

#[derive(Debug, Clone, Row, Serialize)]
pub struct SlowRequestRow {
    pub endpoint: String,
    pub method: String,
    pub duration: f64,
    pub timestamp: i64,
    pub user_id: Option<String>,
    pub metadata: String,
}

/// Inserts a batch of enriched events as one insert block.
pub async fn insert_events(client: &ClickHouseClient, events: &[EnrichedEvent]) -> Result<usize> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut insert = client
        .inner()
        .insert("events")
        .map_err(|e| Error::storage(format!("Insert init error: {}", e)))?;

    for event in events {
        let row = EventRow::from(event);
        insert
            .write(&row)
            .await
            .map_err(|e| Error::storage(format!("Insert write error: {}", e)))?;
    }

    insert
        .end()
        .await
        .map_err(|e| Error::storage(format!("Insert commit error: {}", e)))?;

    debug!(count = events.len(), "Inserted event batch");
    Ok(events.len())
}

/// Inserts a batch of metric samples as one insert block.
pub async fn insert_metrics(client: &ClickHouseClient, samples: &[MetricSample]) -> Result<usize> {
    if samples.is_empty() {
        return Ok(0);
    }

    let mut insert = client
        .inner()
        .insert("metrics")
        .map_err(|e| Error::storage(format!("Insert init error: {}", e)))?;

    for sample in samples {
        let row = MetricRow::from(sample);
        insert
            .write(&row)
            .await
            .map_err(|e| Error::storage(format!("Insert write error: {}", e)))?;
    }

    insert
        .end()
        .await
        .map_err(|e| Error::storage(format!("Insert commit error: {}", e)))?;

    debug!(count = samples.len(), "Inserted metric batch");
    Ok(samples.len())
}

/// Inserts a single error record.
pub async fn insert_error(client: &ClickHouseClient, record: ErrorRecord) -> Result<()> {
    let row = ErrorRow {
        error_type: record.error_type,
        message: record.message,
        stack_trace: record.stack_trace,
        timestamp: record.timestamp.timestamp_millis(),
        user_id: record.user_id,
        session_id: record.session_id,
        metadata: record.metadata,
    };

    let mut insert = client
        .inner()
        .insert("errors")
        .map_err(|e| Error::storage(format!("Insert init error: {}", e)))?;
    insert
        .write(&row)
        .await
        .map_err(|e| Error::storage(format!("Insert write error: {}", e)))?;
    insert
        .end()
        .await
        .map_err(|e| Error::storage(format!("Insert commit error: {}", e)))?;

    Ok(())
}

/// Inserts a single slow-request record.
pub async fn insert_slow_request(client: &ClickHouseClient, record: SlowRequest) -> Result<()> {
    let row = SlowRequestRow {
        endpoint: record.endpoint,
        method: record.method,
        duration: record.duration,
        timestamp: record.timestamp.timestamp_millis(),
        user_id: record.user_id,
        metadata: record.metadata,
    };

    let mut insert = client
        .inner()
        .insert("slow_requests")
        .map_err(|e| Error::storage(format!("Insert init error: {}", e)))?;
    insert
        .write(&row)
        .await
        .map_err(|e| Error::storage(format!("Insert write error: {}", e)))?;
    insert
        .end()
        .await
        .map_err(|e| Error::storage(format!("Insert commit error: {}", e)))?;

    Ok(())
}
