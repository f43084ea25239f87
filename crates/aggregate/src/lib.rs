//! Sliding-window statistics, metric buffering, and aggregation for the
//! Beacon engine.

pub mod metrics_store;
pub mod service;
pub mod window;

pub use metrics_store::{MetricsStore, MetricsStoreConfig};
pub use service::AggregatorService;
pub use window::SlidingWindow;
