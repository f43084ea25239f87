//! Queue message envelope types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default retry budget for queue messages.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A message owned by the durable queue from enqueue until its terminal
/// outcome (handled or dead-lettered). Only `retries` mutates, incremented
/// on each failed handling attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub enqueued_at: i64,
    pub retries: u32,
    pub max_retries: u32,
}

impl QueueMessage {
    pub fn new(message_type: impl Into<String>, payload: Value, enqueued_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type: message_type.into(),
            payload,
            enqueued_at,
            retries: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Delay before the next attempt: `2^retries` seconds. The shift is
    /// capped so pathological retry counts stay well-defined.
    pub fn backoff_ms(&self) -> i64 {
        1000 * (1i64 << self.retries.min(20))
    }
}

/// Terminal envelope for messages that exhausted their retry budget or
/// had no registered handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    #[serde(flatten)]
    pub message: QueueMessage,
    /// Milliseconds since the Unix epoch at dead-letter time.
    pub failed_at: i64,
}
