//! Test fixtures: event and sample builders.

use chrono::Utc;
use serde_json::Value;

use beacon_core::{EnrichedEvent, Event, EventType, MetricSample};

/// A plain pageview event.
pub fn pageview() -> Event {
    let mut event = Event::new(EventType::Pageview);
    event.session_id = Some("sess-123".to_string());
    event
        .metadata
        .insert("path".to_string(), Value::String("/".to_string()));
    event
}

/// An api_call event with a duration and response metadata.
pub fn api_call(endpoint: &str, duration: f64, status_code: u16) -> Event {
    let mut event = Event::new(EventType::ApiCall);
    event.duration = Some(duration);
    event
        .metadata
        .insert("endpoint".to_string(), Value::String(endpoint.to_string()));
    event
        .metadata
        .insert("method".to_string(), Value::String("GET".to_string()));
    event
        .metadata
        .insert("statusCode".to_string(), Value::from(status_code));
    event
}

/// An error event of the given type.
pub fn error_event(error_type: &str, message: &str) -> Event {
    let mut event = Event::new(EventType::Error);
    event.user_id = Some("user-1".to_string());
    event
        .metadata
        .insert("errorType".to_string(), Value::String(error_type.to_string()));
    event
        .metadata
        .insert("message".to_string(), Value::String(message.to_string()));
    event
}

/// Enrich an event the way the pipeline would.
pub fn enriched(event: Event) -> EnrichedEvent {
    EnrichedEvent::enrich(event, "test-node")
}

/// A metric sample at an explicit timestamp.
pub fn sample(name: &str, value: f64, timestamp: i64) -> MetricSample {
    MetricSample::new(name, value, timestamp)
}

/// A metric sample stamped now.
pub fn sample_now(name: &str, value: f64) -> MetricSample {
    MetricSample::new(name, value, Utc::now().timestamp_millis())
}
