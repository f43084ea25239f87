//! The fast key-value/sorted-set cache boundary.
//!
//! The engine core only ever sees this trait. The in-process
//! [`MemoryCache`](crate::MemoryCache) implements it for single-node
//! deployments and tests; a networked store plugs in at the same seam.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::Result;

/// Cache operations consumed by the queue, aggregator, metrics store, and
/// pipeline.
///
/// Atomicity contract: every pop operation (`sorted_pop_ready`,
/// `sorted_pop_max`, `list_pop`, `list_drain`) removes and returns its
/// member in one step against the backing store. The durable queue's
/// no-double-dequeue guarantee rests on this.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a plain value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a plain value with a time-to-live.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove a key of any kind.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Increment a numeric hash field, creating it at zero first.
    /// Returns the new value.
    async fn hash_incr(&self, key: &str, field: &str, delta: f64) -> Result<f64>;

    /// Read all fields of a numeric hash.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, f64>>;

    /// Set a time-to-live on an existing hash, sorted set, or list.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Add a member to a sorted set.
    async fn sorted_add(&self, key: &str, score: f64, member: String) -> Result<()>;

    /// Pop the lowest-scored member whose score is `<= max_score`, if any.
    /// Ties resolve in insertion order.
    async fn sorted_pop_ready(&self, key: &str, max_score: f64) -> Result<Option<String>>;

    /// Pop the highest-scored member. Ties resolve in insertion order.
    async fn sorted_pop_max(&self, key: &str) -> Result<Option<String>>;

    /// Number of members in a sorted set.
    async fn sorted_len(&self, key: &str) -> Result<usize>;

    /// Push a value onto the head of a list.
    async fn list_push(&self, key: &str, value: String) -> Result<()>;

    /// Pop a value from the tail of a list (FIFO with `list_push`).
    async fn list_pop(&self, key: &str) -> Result<Option<String>>;

    /// Number of values in a list.
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Remove and return the entire list, oldest first.
    async fn list_drain(&self, key: &str) -> Result<Vec<String>>;

    /// Publish a payload to a channel. Returns the number of subscribers
    /// that received it. Best-effort: zero subscribers is not an error.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize>;
}
