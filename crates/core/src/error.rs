//! Unified error types for the Beacon engine.
//!
//! Nothing in this taxonomy is fatal to the process: storage and cache
//! failures are re-buffered and surfaced, handler failures are retried or
//! dead-lettered by the queue, and the rest are reported to the caller.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the Beacon engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The durable store was unreachable or rejected a write. Batching
    /// layers re-buffer the captured items before surfacing this.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The key-value/sorted-set cache was unreachable or rejected an
    /// operation.
    #[error("cache failure: {0}")]
    Cache(String),

    /// A queue message handler failed. The queue retries with backoff and
    /// eventually dead-letters the message.
    #[error("handler failure for message {id}: {reason}")]
    Handler { id: String, reason: String },

    /// No handler is registered for this message type. The message goes
    /// straight to the dead-letter sink, never retried.
    #[error("no handler registered for message type: {0}")]
    Unroutable(String),

    /// An unknown aggregation interval key was requested.
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    /// A per-event processor failed. Isolated per event; never aborts the
    /// batch or other processors.
    #[error("processor {name} failed: {reason}")]
    Processor { name: String, reason: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a cache error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a handler failure error.
    pub fn handler(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a processor failure error.
    pub fn processor(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processor {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this failure class is worth retrying at a coarser level.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Cache(_))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
