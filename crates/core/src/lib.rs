//! Core types, errors, and shared math for the Beacon analytics engine.

pub mod error;
pub mod events;
pub mod metrics;
pub mod queue;
pub mod stats;

pub use error::{Error, Result};
pub use events::{EnrichedEvent, Event, EventType};
pub use metrics::{
    AggregationQuery, AggregationResult, AggregationType, Interval, MetricAggregates, MetricKey,
    MetricSample, MetricWindow, RealtimeStats, TopMetric, WindowStats,
};
pub use queue::{DeadLetter, QueueMessage, DEFAULT_MAX_RETRIES};
