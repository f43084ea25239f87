//! Metric samples, aggregates, and aggregation query types.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::Error;
use crate::stats::nearest_rank;

/// A single numeric measurement.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MetricSample {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
            tags: BTreeMap::new(),
        }
    }

    /// Minute-aligned bucket index this sample belongs to.
    pub fn minute_bucket(&self) -> i64 {
        self.timestamp.div_euclid(60_000)
    }
}

/// Buffer key for per-metric-per-minute grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub name: String,
    pub minute: i64,
}

impl MetricKey {
    pub fn of(sample: &MetricSample) -> Self {
        Self {
            name: sample.name.clone(),
            minute: sample.minute_bucket(),
        }
    }

    /// Cache key for the aggregates computed over this buffer.
    pub fn cache_key(&self) -> String {
        format!("agg:{}:{}", self.name, self.minute)
    }
}

/// Aggregates computed over one flushed metric buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregates {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl MetricAggregates {
    /// Computes aggregates over the given values. Returns `None` for an
    /// empty slice.
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len() as u64;
        let sum: f64 = sorted.iter().sum();

        Some(Self {
            count,
            sum,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            avg: sum / count as f64,
            p50: nearest_rank(&sorted, 50.0)?,
            p95: nearest_rank(&sorted, 95.0)?,
            p99: nearest_rank(&sorted, 99.0)?,
        })
    }
}

/// Supported aggregation functions.
///
/// Unknown names deserialize to `Avg`, the documented fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Sum,
    Min,
    Max,
    Count,
    P50,
    P95,
    P99,
    #[serde(other)]
    Avg,
}

impl AggregationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::P50 => "p50",
            Self::P95 => "p95",
            Self::P99 => "p99",
        }
    }

    /// Parses an aggregation name, falling back to `Avg` for unknown input.
    pub fn parse_or_avg(s: &str) -> Self {
        match s {
            "sum" => Self::Sum,
            "min" => Self::Min,
            "max" => Self::Max,
            "count" => Self::Count,
            "p50" => Self::P50,
            "p95" => Self::P95,
            "p99" => Self::P99,
            _ => Self::Avg,
        }
    }
}

/// Supported aggregation interval keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl Interval {
    pub const ALL: [Interval; 7] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::OneHour,
        Self::SixHours,
        Self::OneDay,
        Self::SevenDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::OneDay => "24h",
            Self::SevenDays => "7d",
        }
    }

    /// Interval duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match self {
            Self::OneMinute => 60_000,
            Self::FiveMinutes => 5 * 60_000,
            Self::FifteenMinutes => 15 * 60_000,
            Self::OneHour => 3_600_000,
            Self::SixHours => 6 * 3_600_000,
            Self::OneDay => 24 * 3_600_000,
            Self::SevenDays => 7 * 24 * 3_600_000,
        }
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|i| i.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidInterval(s.to_string()))
    }
}

/// A historical aggregation request.
///
/// `filters` is a `BTreeMap` so the cache key is insensitive to filter
/// insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub metric: String,
    pub aggregation: AggregationType,
    pub interval: Interval,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub filters: Option<BTreeMap<String, String>>,
}

impl AggregationQuery {
    /// Deterministic cache key: identical queries share an entry.
    pub fn cache_key(&self) -> String {
        let filters = self
            .filters
            .as_ref()
            .and_then(|f| serde_json::to_string(f).ok())
            .unwrap_or_else(|| "{}".to_string());

        format!(
            "agg:{}:{}:{}:{}:{}:{}",
            self.metric,
            self.aggregation.as_str(),
            self.interval.as_str(),
            self.start_time.timestamp_millis(),
            self.end_time.timestamp_millis(),
            filters
        )
    }
}

/// One output row per aggregation bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Bucket start, RFC3339.
    pub timestamp: String,
    pub value: f64,
    pub metric: String,
    pub aggregation: String,
}

/// Statistics snapshot read from one sliding window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub sum: f64,
    pub avg: f64,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

/// Realtime statistics response for one metric/interval pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeStats {
    pub metric: String,
    pub interval: Interval,
    pub timestamp: DateTime<Utc>,
    pub stats: WindowStats,
}

/// A durable-store window row (read path, not hot path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricWindow {
    /// Window start, epoch ms.
    pub start: i64,
    /// Window end, epoch ms.
    pub end: i64,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// A most-active-metric row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopMetric {
    pub name: String,
    pub count: u64,
    /// Epoch ms of the most recent sample.
    pub last_seen: i64,
}
