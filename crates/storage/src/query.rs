//! Aggregation and maintenance queries.

use std::collections::BTreeMap;

use clickhouse::Row;
use serde::Deserialize;
use tracing::debug;

use beacon_core::{AggregationType, Error, MetricWindow, Result, TopMetric};

use crate::client::ClickHouseClient;

/// SQL aggregation expression for one aggregation type. Percentiles use
/// ClickHouse quantile(), which interpolates (continuous semantics).
fn aggregation_expr(aggregation: AggregationType) -> &'static str {
    match aggregation {
        AggregationType::Sum => "sum(value)",
        AggregationType::Avg => "avg(value)",
        AggregationType::Min => "min(value)",
        AggregationType::Max => "max(value)",
        AggregationType::Count => "toFloat64(count(value))",
        AggregationType::P50 => "quantile(0.5)(value)",
        AggregationType::P95 => "quantile(0.95)(value)",
        AggregationType::P99 => "quantile(0.99)(value)",
    }
}

/// Aggregates event values for one metric over `[start_ms, end_ms)`.
///
/// The metric name and any extra filters are matched against the event
/// metadata blob. An empty bucket yields 0.
pub async fn aggregate_range(
    client: &ClickHouseClient,
    metric: &str,
    start_ms: i64,
    end_ms: i64,
    aggregation: AggregationType,
    filters: Option<&BTreeMap<String, String>>,
) -> Result<f64> {
    let mut sql = format!(
        "SELECT {} FROM events \
         WHERE timestamp >= fromUnixTimestamp64Milli(?) \
         AND timestamp < fromUnixTimestamp64Milli(?) \
         AND JSONExtractString(metadata, 'metric_name') = ?",
        aggregation_expr(aggregation)
    );

    if let Some(filters) = filters {
        for _ in filters {
            sql.push_str(" AND JSONExtractString(metadata, ?) = ?");
        }
    }

    let mut query = client
        .inner()
        .query(&sql)
        .bind(start_ms)
        .bind(end_ms)
        .bind(metric);

    if let Some(filters) = filters {
        for (key, value) in filters {
            query = query.bind(key.as_str()).bind(value.as_str());
        }
    }

    let value: f64 = query
        .fetch_one()
        .await
        .map_err(|e| Error::storage(format!("Aggregation query error: {}", e)))?;

    // Empty buckets surface as NaN from avg/quantile
    Ok(if value.is_finite() { value } else { 0.0 })
}

#[derive(Debug, Row, Deserialize)]
struct MetricWindowRow {
    window_start: i64,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    avg: f64,
}

/// Windowed aggregates for one metric name over `[start_ms, end_ms)`.
pub async fn metric_window(
    client: &ClickHouseClient,
    name: &str,
    start_ms: i64,
    end_ms: i64,
    window_ms: i64,
) -> Result<Vec<MetricWindow>> {
    let rows: Vec<MetricWindowRow> = client
        .inner()
        .query(
            "SELECT intDiv(toUnixTimestamp64Milli(timestamp), ?) * ? AS window_start, \
             count() AS count, sum(value) AS sum, min(value) AS min, \
             max(value) AS max, avg(value) AS avg \
             FROM metrics \
             WHERE name = ? \
             AND timestamp >= fromUnixTimestamp64Milli(?) \
             AND timestamp < fromUnixTimestamp64Milli(?) \
             GROUP BY window_start ORDER BY window_start",
        )
        .bind(window_ms)
        .bind(window_ms)
        .bind(name)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all()
        .await
        .map_err(|e| Error::storage(format!("Window query error: {}", e)))?;

    Ok(rows
        .into_iter()
        .map(|r| MetricWindow {
            start: r.window_start,
            end: r.window_start + window_ms,
            count: r.count,
            sum: r.sum,
            min: r.min,
            max: r.max,
            avg: r.avg,
        })
        .collect())
}

#[derive(Debug, Row, Deserialize)]
struct TopMetricRow {
    name: String,
    count: u64,
    last_seen: i64,
}

/// Most active metric names over the last hour.
pub async fn top_metrics(client: &ClickHouseClient, limit: u32) -> Result<Vec<TopMetric>> {
    let rows: Vec<TopMetricRow> = client
        .inner()
        .query(
            "SELECT name, count() AS count, \
             toUnixTimestamp64Milli(max(timestamp)) AS last_seen \
             FROM metrics \
             WHERE timestamp > now() - INTERVAL 1 HOUR \
             GROUP BY name ORDER BY count DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all()
        .await
        .map_err(|e| Error::storage(format!("Top metrics query error: {}", e)))?;

    Ok(rows
        .into_iter()
        .map(|r| TopMetric {
            name: r.name,
            count: r.count,
            last_seen: r.last_seen,
        })
        .collect())
}

/// Deletes metric rows older than the cutoff. Returns the number of rows
/// the retention predicate matched at delete time.
pub async fn delete_metrics_before(client: &ClickHouseClient, cutoff_ms: i64) -> Result<u64> {
    let count: u64 = client
        .inner()
        .query("SELECT count() FROM metrics WHERE timestamp < fromUnixTimestamp64Milli(?)")
        .bind(cutoff_ms)
        .fetch_one()
        .await
        .map_err(|e| Error::storage(format!("Retention count error: {}", e)))?;

    client
        .inner()
        .query("ALTER TABLE metrics DELETE WHERE timestamp < fromUnixTimestamp64Milli(?)")
        .bind(cutoff_ms)
        .execute()
        .await
        .map_err(|e| Error::storage(format!("Retention delete error: {}", e)))?;

    debug!(deleted = count, "Old metrics deleted");
    Ok(count)
}
