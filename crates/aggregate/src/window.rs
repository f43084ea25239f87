//! Fixed-size time-bucketed sliding window.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;

use beacon_core::stats::nearest_rank;
use beacon_core::WindowStats;

/// Default bucket granularity.
const DEFAULT_BUCKET_MS: i64 = 1000;

/// A numeric accumulator over a fixed time window.
///
/// Values land in buckets of `bucket_ms`; buckets older than
/// `window_ms` are purged before every read and write, so reads never
/// reflect stale data and memory stays bounded by
/// `window_ms / bucket_ms` buckets. Mutation is internal, so a shared
/// window is safe to feed through `&self` from concurrent callers.
///
/// Percentile queries sort the full retained value set per call. Window
/// sizes bound that cost; correctness, not asymptotic optimality, is the
/// contract here.
pub struct SlidingWindow {
    window_ms: i64,
    bucket_ms: i64,
    buckets: Mutex<BTreeMap<i64, Vec<f64>>>,
}

impl SlidingWindow {
    pub fn new(window_ms: i64) -> Self {
        Self::with_bucket_size(window_ms, DEFAULT_BUCKET_MS)
    }

    pub fn with_bucket_size(window_ms: i64, bucket_ms: i64) -> Self {
        Self {
            window_ms,
            bucket_ms,
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    fn cutoff(&self, timestamp_ms: i64) -> i64 {
        (timestamp_ms - self.window_ms).div_euclid(self.bucket_ms)
    }

    /// Drops buckets strictly older than the cutoff index.
    fn cleanup(buckets: &mut BTreeMap<i64, Vec<f64>>, cutoff: i64) {
        *buckets = buckets.split_off(&cutoff);
    }

    /// Adds a value at the current time.
    pub fn add(&self, value: f64) {
        self.add_at(value, Utc::now().timestamp_millis());
    }

    /// Adds a value at an explicit timestamp.
    pub fn add_at(&self, value: f64, timestamp_ms: i64) {
        let bucket = timestamp_ms.div_euclid(self.bucket_ms);
        let mut buckets = self.buckets.lock();
        buckets.entry(bucket).or_default().push(value);
        Self::cleanup(&mut buckets, self.cutoff(timestamp_ms));
    }

    pub fn sum(&self) -> f64 {
        self.sum_at(Utc::now().timestamp_millis())
    }

    pub fn sum_at(&self, timestamp_ms: i64) -> f64 {
        let mut buckets = self.buckets.lock();
        Self::cleanup(&mut buckets, self.cutoff(timestamp_ms));
        buckets.values().flatten().sum()
    }

    pub fn count(&self) -> u64 {
        self.count_at(Utc::now().timestamp_millis())
    }

    pub fn count_at(&self, timestamp_ms: i64) -> u64 {
        let mut buckets = self.buckets.lock();
        Self::cleanup(&mut buckets, self.cutoff(timestamp_ms));
        buckets.values().map(|v| v.len() as u64).sum()
    }

    pub fn average(&self) -> f64 {
        self.average_at(Utc::now().timestamp_millis())
    }

    pub fn average_at(&self, timestamp_ms: i64) -> f64 {
        let mut buckets = self.buckets.lock();
        Self::cleanup(&mut buckets, self.cutoff(timestamp_ms));

        let (sum, count) = buckets
            .values()
            .flatten()
            .fold((0.0, 0u64), |(s, c), v| (s + v, c + 1));
        if count > 0 {
            sum / count as f64
        } else {
            0.0
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.min_at(Utc::now().timestamp_millis())
    }

    pub fn min_at(&self, timestamp_ms: i64) -> Option<f64> {
        let mut buckets = self.buckets.lock();
        Self::cleanup(&mut buckets, self.cutoff(timestamp_ms));
        buckets
            .values()
            .flatten()
            .copied()
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    pub fn max(&self) -> Option<f64> {
        self.max_at(Utc::now().timestamp_millis())
    }

    pub fn max_at(&self, timestamp_ms: i64) -> Option<f64> {
        let mut buckets = self.buckets.lock();
        Self::cleanup(&mut buckets, self.cutoff(timestamp_ms));
        buckets
            .values()
            .flatten()
            .copied()
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }

    /// Nearest-rank percentile over all retained values. `None` when the
    /// window is empty.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentile_at(p, Utc::now().timestamp_millis())
    }

    pub fn percentile_at(&self, p: f64, timestamp_ms: i64) -> Option<f64> {
        let mut buckets = self.buckets.lock();
        Self::cleanup(&mut buckets, self.cutoff(timestamp_ms));

        let mut values: Vec<f64> = buckets.values().flatten().copied().collect();
        values.sort_by(f64::total_cmp);
        nearest_rank(&values, p)
    }

    /// One-pass snapshot of every statistic.
    pub fn stats(&self) -> WindowStats {
        self.stats_at(Utc::now().timestamp_millis())
    }

    pub fn stats_at(&self, timestamp_ms: i64) -> WindowStats {
        let mut buckets = self.buckets.lock();
        Self::cleanup(&mut buckets, self.cutoff(timestamp_ms));

        let mut values: Vec<f64> = buckets.values().flatten().copied().collect();
        values.sort_by(f64::total_cmp);

        let count = values.len() as u64;
        let sum: f64 = values.iter().sum();

        WindowStats {
            sum,
            avg: if count > 0 { sum / count as f64 } else { 0.0 },
            count,
            min: values.first().copied(),
            max: values.last().copied(),
            p50: nearest_rank(&values, 50.0),
            p95: nearest_rank(&values, 95.0),
            p99: nearest_rank(&values, 99.0),
        }
    }

    pub fn clear(&self) {
        self.buckets.lock().clear();
    }
}
