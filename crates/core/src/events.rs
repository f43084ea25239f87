//! Event types flowing through the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

/// Discrete event categories accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pageview,
    Click,
    ApiCall,
    Error,
    Custom,
}

impl EventType {
    /// Returns the event type as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pageview => "pageview",
            Self::Click => "click",
            Self::ApiCall => "api_call",
            Self::Error => "error",
            Self::Custom => "custom",
        }
    }
}

/// An inbound analytics event, prior to enrichment.
///
/// `timestamp` may be absent; enrichment stamps the receive time in that
/// case. All other optional fields pass through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: Option<DateTime<Utc>>,
    #[validate(length(max = 128))]
    pub user_id: Option<String>,
    #[validate(length(max = 128))]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub value: Option<f64>,
    pub duration: Option<f64>,
}

impl Event {
    /// Creates a bare event of the given type.
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            timestamp: None,
            user_id: None,
            session_id: None,
            metadata: Map::new(),
            tags: Vec::new(),
            value: None,
            duration: None,
        }
    }
}

/// An event after enrichment.
///
/// Immutable once constructed; the pipeline owns it until it is persisted,
/// after which durable storage is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub tags: Vec<String>,
    pub value: Option<f64>,
    pub duration: Option<f64>,
}

impl EnrichedEvent {
    /// Stamps a concrete timestamp and processing metadata onto an event.
    pub fn enrich(event: Event, server_id: &str) -> Self {
        let now = Utc::now();
        let mut metadata = event.metadata;
        metadata.insert(
            "processed_at".to_string(),
            Value::String(now.to_rfc3339()),
        );
        metadata.insert(
            "server_id".to_string(),
            Value::String(server_id.to_string()),
        );

        Self {
            event_type: event.event_type,
            timestamp: event.timestamp.unwrap_or(now),
            user_id: event.user_id,
            session_id: event.session_id,
            metadata,
            tags: event.tags,
            value: event.value,
            duration: event.duration,
        }
    }

    /// String metadata lookup.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Numeric metadata lookup.
    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }

    /// Day key for rolling daily counters (UTC).
    pub fn day_key(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}
