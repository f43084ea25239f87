//! Durable storage boundary and ClickHouse backend for the Beacon engine.

pub mod client;
pub mod config;
pub mod insert;
pub mod query;
pub mod schema;
pub mod store;

pub use client::ClickHouseClient;
pub use config::ClickHouseConfig;
pub use store::{AnalyticsStore, ErrorRecord, SlowRequest};
