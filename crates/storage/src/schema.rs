//! ClickHouse table schemas.
//!
//! - LowCardinality for enum-like fields
//! - DateTime64(3) for millisecond precision
//! - JSON string blobs for metadata extensibility

/// SQL for creating the events table.
///
/// Main event stream written by the ingestion pipeline; also the source
/// table for historical bucketed aggregation.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id String,
    type LowCardinality(String),
    timestamp DateTime64(3),

    user_id Nullable(String),
    session_id Nullable(String),

    -- Extensible JSON metadata blob (enrichment keys included)
    metadata String,
    tags Array(String),

    value Nullable(Float64),
    duration Nullable(Float64),

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (type, timestamp, id)
TTL toDateTime(timestamp) + INTERVAL 90 DAY
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the metrics table.
///
/// Raw samples flushed by the metrics store; window and top-N reads and
/// retention deletes run against it.
pub const CREATE_METRICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    name LowCardinality(String),
    value Float64,
    timestamp DateTime64(3),
    tags String,
    aggregation_type LowCardinality(String) DEFAULT 'raw',

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (name, timestamp)
TTL toDateTime(timestamp) + INTERVAL 90 DAY
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the errors table, written by the error processor.
pub const CREATE_ERRORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS errors (
    error_type LowCardinality(String),
    message String,
    stack_trace String,
    timestamp DateTime64(3),
    user_id Nullable(String),
    session_id Nullable(String),
    metadata String,

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (error_type, timestamp)
TTL toDateTime(timestamp) + INTERVAL 30 DAY
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the slow requests table, written by the performance
/// processor for api_call events over the slow threshold.
pub const CREATE_SLOW_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS slow_requests (
    endpoint String,
    method LowCardinality(String),
    duration Float64,
    timestamp DateTime64(3),
    user_id Nullable(String),
    metadata String,

    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY (endpoint, timestamp)
TTL toDateTime(timestamp) + INTERVAL 30 DAY
SETTINGS index_granularity = 8192
"#;

/// All table DDL, in creation order.
pub const ALL_TABLES: [&str; 4] = [
    CREATE_EVENTS_TABLE,
    CREATE_METRICS_TABLE,
    CREATE_ERRORS_TABLE,
    CREATE_SLOW_REQUESTS_TABLE,
];
