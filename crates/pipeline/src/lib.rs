//! Batching, ingestion orchestration, and event processors for the
//! Beacon engine.

pub mod batch;
pub mod ingest;
pub mod processors;

pub use batch::{BatchProcessor, BatchSink};
pub use ingest::{IngestionPipeline, PipelineConfig, QueueStatus, REALTIME_CHANNEL};
pub use processors::{ErrorProcessor, PerformanceProcessor, Processor};
