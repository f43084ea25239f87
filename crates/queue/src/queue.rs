//! Multi-tier durable message queue.
//!
//! Three lanes per named queue over the cache boundary: an immediate FIFO
//! list, a priority sorted set (max first), and a delayed sorted set keyed
//! by ready time. Messages are owned by the queue from enqueue until they
//! are handled or dead-lettered. Delivery is at-least-once: a handler
//! failure re-enqueues the message with exponential backoff until its
//! retry budget runs out, after which it lands in the dead-letter sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use beacon_cache::CacheStore;
use beacon_core::{DeadLetter, QueueMessage, Result, DEFAULT_MAX_RETRIES};
use beacon_telemetry::metrics;

use crate::worker::WorkerSlot;

/// Handler invoked for each dequeued message of a registered type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &QueueMessage) -> Result<()>;
}

/// Routing options for `enqueue`. When both `delay` and `priority` are
/// set, delay wins and the message goes to the delayed lane.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    pub priority: Option<f64>,
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            priority: None,
            delay: Some(delay),
        }
    }

    pub fn with_priority(priority: f64) -> Self {
        Self {
            priority: Some(priority),
            delay: None,
        }
    }
}

/// Per-lane depths, including the dead-letter sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepths {
    pub immediate: usize,
    pub priority: usize,
    pub delayed: usize,
    pub dead_letter: usize,
}

/// A named multi-tier queue.
pub struct DurableQueue {
    name: String,
    cache: Arc<dyn CacheStore>,
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    workers: parking_lot::Mutex<Vec<WorkerSlot>>,
    max_retries: u32,
}

impl DurableQueue {
    pub fn new(name: impl Into<String>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            name: name.into(),
            cache,
            handlers: RwLock::new(HashMap::new()),
            workers: parking_lot::Mutex::new(Vec::new()),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub(crate) fn workers_mut(&self) -> parking_lot::MutexGuard<'_, Vec<WorkerSlot>> {
        self.workers.lock()
    }

    /// Overrides the retry budget stamped onto new messages.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn immediate_key(&self) -> String {
        format!("queue:{}", self.name)
    }

    fn priority_key(&self) -> String {
        format!("queue:{}:priority", self.name)
    }

    fn delayed_key(&self) -> String {
        format!("queue:{}:delayed", self.name)
    }

    fn dlq_key(&self) -> String {
        format!("dlq:{}", self.name)
    }

    /// Registers the handler for a message type. Messages of unregistered
    /// types are dead-lettered on dequeue.
    pub fn register_handler(&self, message_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.handlers
            .write()
            .insert(message_type.into(), handler);
    }

    /// Enqueues a new message into exactly one lane.
    pub async fn enqueue(
        &self,
        message_type: impl Into<String>,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<Uuid> {
        let mut message =
            QueueMessage::new(message_type, payload, Utc::now().timestamp_millis());
        message.max_retries = self.max_retries;

        let id = message.id;
        let serialized = serde_json::to_string(&message)?;

        // Delay wins over priority when both are supplied.
        if let Some(delay) = options.delay {
            let ready_at = message.enqueued_at + delay.as_millis() as i64;
            self.cache
                .sorted_add(&self.delayed_key(), ready_at as f64, serialized)
                .await?;
        } else if let Some(priority) = options.priority {
            self.cache
                .sorted_add(&self.priority_key(), priority, serialized)
                .await?;
        } else {
            self.cache
                .list_push(&self.immediate_key(), serialized)
                .await?;
        }

        metrics().messages_enqueued.inc();
        debug!(message_id = %id, message_type = %message.message_type, "Message enqueued");
        Ok(id)
    }

    /// Pops the next message, checking lanes in strict order: ready
    /// delayed messages, then highest priority, then oldest immediate.
    /// Each pop is atomic against the backing store, so no two workers
    /// ever receive the same message.
    pub async fn dequeue(&self) -> Result<Option<QueueMessage>> {
        let now = Utc::now().timestamp_millis() as f64;

        if let Some(raw) = self
            .cache
            .sorted_pop_ready(&self.delayed_key(), now)
            .await?
        {
            return Ok(Some(serde_json::from_str(&raw)?));
        }

        if let Some(raw) = self.cache.sorted_pop_max(&self.priority_key()).await? {
            return Ok(Some(serde_json::from_str(&raw)?));
        }

        if let Some(raw) = self.cache.list_pop(&self.immediate_key()).await? {
            return Ok(Some(serde_json::from_str(&raw)?));
        }

        Ok(None)
    }

    /// Dequeues and dispatches one message. Returns false when every lane
    /// was empty. Handler failures are absorbed into the retry path; only
    /// store failures surface as errors.
    pub(crate) async fn process_one(&self) -> Result<bool> {
        let Some(message) = self.dequeue().await? else {
            return Ok(false);
        };

        let handler = self.handlers.read().get(&message.message_type).cloned();
        let Some(handler) = handler else {
            warn!(message_type = %message.message_type, "No handler for message type");
            self.dead_letter(message).await?;
            return Ok(true);
        };

        match handler.handle(&message).await {
            Ok(()) => {
                metrics().messages_processed.inc();
                debug!(message_id = %message.id, "Message processed");
            }
            Err(e) => {
                error!(message_id = %message.id, error = %e, "Error processing message");
                self.retry(message).await?;
            }
        }

        Ok(true)
    }

    /// Increments the retry counter, then either re-enqueues the same
    /// message into the delayed lane with exponential backoff or moves it
    /// to the dead-letter sink once the budget is exhausted.
    async fn retry(&self, mut message: QueueMessage) -> Result<()> {
        message.retries += 1;

        if message.retries >= message.max_retries {
            return self.dead_letter(message).await;
        }

        let ready_at = Utc::now().timestamp_millis() + message.backoff_ms();
        let serialized = serde_json::to_string(&message)?;
        self.cache
            .sorted_add(&self.delayed_key(), ready_at as f64, serialized)
            .await?;

        metrics().messages_retried.inc();
        debug!(
            message_id = %message.id,
            retries = message.retries,
            backoff_ms = message.backoff_ms(),
            "Message scheduled for retry"
        );
        Ok(())
    }

    /// Moves a message to the dead-letter sink. Terminal: dead-lettered
    /// messages are never auto-retried.
    async fn dead_letter(&self, message: QueueMessage) -> Result<()> {
        let id = message.id;
        let dead = DeadLetter {
            message,
            failed_at: Utc::now().timestamp_millis(),
        };
        self.cache
            .list_push(&self.dlq_key(), serde_json::to_string(&dead)?)
            .await?;

        metrics().messages_dead_lettered.inc();
        error!(message_id = %id, "Message sent to dead letter queue");
        Ok(())
    }

    /// Moves the entire dead-letter contents back onto the immediate lane
    /// in their original order and clears the sink. Retry counters are
    /// not reset, so a reprocessed message gets one more attempt before
    /// dead-lettering again. Returns the number of messages moved.
    pub async fn reprocess_dlq(&self) -> Result<usize> {
        let drained = self.cache.list_drain(&self.dlq_key()).await?;

        for raw in &drained {
            let dead: DeadLetter = serde_json::from_str(raw)?;
            self.cache
                .list_push(&self.immediate_key(), serde_json::to_string(&dead.message)?)
                .await?;
        }

        Ok(drained.len())
    }

    /// Per-lane depths for observability.
    pub async fn queue_depths(&self) -> Result<QueueDepths> {
        Ok(QueueDepths {
            immediate: self.cache.list_len(&self.immediate_key()).await?,
            priority: self.cache.sorted_len(&self.priority_key()).await?,
            delayed: self.cache.sorted_len(&self.delayed_key()).await?,
            dead_letter: self.cache.list_len(&self.dlq_key()).await?,
        })
    }

    /// Drops every active lane. The dead-letter sink is left intact.
    pub async fn clear(&self) -> Result<()> {
        self.cache.delete(&self.immediate_key()).await?;
        self.cache.delete(&self.priority_key()).await?;
        self.cache.delete(&self.delayed_key()).await?;
        Ok(())
    }
}
