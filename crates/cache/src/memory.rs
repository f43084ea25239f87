//! In-process implementation of the cache boundary.
//!
//! Backs single-node deployments and the test suite. The plain keyspace
//! rides on moka with a per-entry TTL policy; hashes, sorted sets, and
//! lists are mutex-guarded maps with lazy expiry; pub/sub is a tokio
//! broadcast channel per topic.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use beacon_core::Result;

use crate::store::CacheStore;

/// Broadcast channel capacity per pub/sub topic. Slow subscribers lag and
/// drop, they never block the publisher.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
struct TtlEntry {
    value: String,
    ttl: Duration,
}

/// Per-entry expiry policy reading the TTL stored alongside each value.
struct PerEntryTtl;

impl Expiry<String, TtlEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &TtlEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

#[derive(Debug, Clone)]
struct ScoredMember {
    score: f64,
    seq: u64,
    member: String,
}

/// In-memory cache store.
pub struct MemoryCache {
    kv: Cache<String, TtlEntry>,
    hashes: Mutex<HashMap<String, HashMap<String, f64>>>,
    sorted: Mutex<HashMap<String, Vec<ScoredMember>>>,
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    deadlines: Mutex<HashMap<String, Instant>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    seq: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            kv: Cache::builder()
                .max_capacity(100_000)
                .expire_after(PerEntryTtl)
                .build(),
            hashes: Mutex::new(HashMap::new()),
            sorted: Mutex::new(HashMap::new()),
            lists: Mutex::new(HashMap::new()),
            deadlines: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Subscribe to a pub/sub channel. Used by tests and by the transport
    /// layer that fans updates out to clients.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drops the structure entry for `key` if its deadline has passed.
    fn purge_expired(&self, key: &str) {
        let expired = {
            let mut deadlines = self.deadlines.lock();
            match deadlines.get(key) {
                Some(deadline) if *deadline <= Instant::now() => {
                    deadlines.remove(key);
                    true
                }
                _ => false,
            }
        };

        if expired {
            self.hashes.lock().remove(key);
            self.sorted.lock().remove(key);
            self.lists.lock().remove(key);
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.kv.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.kv.insert(key.to_string(), TtlEntry { value, ttl }).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.kv.invalidate(key).await;
        self.hashes.lock().remove(key);
        self.sorted.lock().remove(key);
        self.lists.lock().remove(key);
        self.deadlines.lock().remove(key);
        Ok(())
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: f64) -> Result<f64> {
        self.purge_expired(key);
        let mut hashes = self.hashes.lock();
        let entry = hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0.0);
        *entry += delta;
        Ok(*entry)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, f64>> {
        self.purge_expired(key);
        Ok(self.hashes.lock().get(key).cloned().unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.deadlines
            .lock()
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn sorted_add(&self, key: &str, score: f64, member: String) -> Result<()> {
        self.purge_expired(key);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.sorted
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(ScoredMember { score, seq, member });
        Ok(())
    }

    async fn sorted_pop_ready(&self, key: &str, max_score: f64) -> Result<Option<String>> {
        self.purge_expired(key);
        let mut sorted = self.sorted.lock();
        let Some(members) = sorted.get_mut(key) else {
            return Ok(None);
        };

        let ready = members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.score <= max_score)
            .min_by(|(_, a), (_, b)| {
                a.score.total_cmp(&b.score).then(a.seq.cmp(&b.seq))
            })
            .map(|(i, _)| i);

        Ok(ready.map(|i| members.remove(i).member))
    }

    async fn sorted_pop_max(&self, key: &str) -> Result<Option<String>> {
        self.purge_expired(key);
        let mut sorted = self.sorted.lock();
        let Some(members) = sorted.get_mut(key) else {
            return Ok(None);
        };

        let top = members
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.score.total_cmp(&b.score).then(b.seq.cmp(&a.seq))
            })
            .map(|(i, _)| i);

        Ok(top.map(|i| members.remove(i).member))
    }

    async fn sorted_len(&self, key: &str) -> Result<usize> {
        self.purge_expired(key);
        Ok(self.sorted.lock().get(key).map_or(0, Vec::len))
    }

    async fn list_push(&self, key: &str, value: String) -> Result<()> {
        self.purge_expired(key);
        self.lists
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_front(value);
        Ok(())
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>> {
        self.purge_expired(key);
        Ok(self
            .lists
            .lock()
            .get_mut(key)
            .and_then(VecDeque::pop_back))
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        self.purge_expired(key);
        Ok(self.lists.lock().get(key).map_or(0, VecDeque::len))
    }

    async fn list_drain(&self, key: &str) -> Result<Vec<String>> {
        self.purge_expired(key);
        let Some(mut list) = self.lists.lock().remove(key) else {
            return Ok(Vec::new());
        };

        let mut drained = Vec::with_capacity(list.len());
        while let Some(value) = list.pop_back() {
            drained.push(value);
        }
        Ok(drained)
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let sender = self.channels.lock().get(channel).cloned();
        Ok(sender
            .map(|s| s.send(payload).unwrap_or(0))
            .unwrap_or(0))
    }
}
