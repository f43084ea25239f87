//! Internal telemetry and tracing for the Beacon engine.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::{metrics, Counter, Gauge, Histogram, Metrics, MetricsSnapshot, METRICS};
pub use tracing_setup::{init_tracing, init_tracing_from_env, TracingConfig};
