//! Beacon Analytics Engine
//!
//! High-throughput event and metric pipeline handling:
//! - Event enrichment, batching, and atomic batch persistence
//! - Durable multi-tier queueing with retry and dead-lettering
//! - Realtime sliding-window statistics and cached historical aggregates
//! - Live-update fan-out over pub/sub

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::signal;
use tracing::{error, info};

use beacon_aggregate::{AggregatorService, MetricsStore, MetricsStoreConfig};
use beacon_cache::{CacheStore, MemoryCache};
use beacon_core::{Event, MetricSample, QueueMessage};
use beacon_pipeline::{
    ErrorProcessor, IngestionPipeline, PerformanceProcessor, PipelineConfig, Processor,
};
use beacon_queue::{DurableQueue, MessageHandler};
use beacon_storage::{AnalyticsStore, ClickHouseClient, ClickHouseConfig};
use beacon_telemetry::init_tracing_from_env;

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    /// Server identity stamped into enriched events
    #[serde(default = "default_server_id")]
    server_id: String,

    /// Event batch size before a synchronous flush
    #[serde(default = "default_batch_size")]
    batch_size: usize,

    /// Timer flush interval for events and metrics (ms)
    #[serde(default = "default_flush_interval_ms")]
    flush_interval_ms: u64,

    /// Queue worker concurrency
    #[serde(default = "default_queue_workers")]
    queue_workers: usize,

    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

fn default_server_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "beacon-1".to_string())
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_queue_workers() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            queue_workers: default_queue_workers(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

/// Queue handler feeding tracked events into the ingestion pipeline.
struct EventHandler {
    pipeline: Arc<IngestionPipeline>,
}

#[async_trait]
impl MessageHandler for EventHandler {
    async fn handle(&self, message: &QueueMessage) -> beacon_core::Result<()> {
        let event: Event = serde_json::from_value(message.payload.clone())?;
        self.pipeline.process_event(event).await
    }
}

/// Queue handler feeding metric samples into the buffered store and the
/// realtime aggregator.
struct MetricHandler {
    metrics_store: Arc<MetricsStore>,
    aggregator: Arc<AggregatorService>,
}

#[async_trait]
impl MessageHandler for MetricHandler {
    async fn handle(&self, message: &QueueMessage) -> beacon_core::Result<()> {
        let sample: MetricSample = serde_json::from_value(message.payload.clone())?;
        self.aggregator
            .add_realtime_metric(&sample.name, sample.value)
            .await?;
        self.metrics_store.store(sample).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting Beacon Analytics Engine v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;

    // Shared cache: queue lanes, counters, aggregate caches, pub/sub
    let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new());
    let cache_store: Arc<dyn CacheStore> = cache.clone();

    // Durable storage
    let clickhouse = Arc::new(
        ClickHouseClient::new(config.clickhouse.clone())
            .context("Failed to create ClickHouse client")?,
    );
    if let Err(e) = clickhouse.init_schema().await {
        error!("Failed to initialize ClickHouse schema: {}", e);
        // Continue anyway - schema might already exist
    }
    let store: Arc<dyn AnalyticsStore> = clickhouse.clone();

    // Ingestion pipeline with the processor plugin set
    let processors: Vec<Arc<dyn Processor>> = vec![
        Arc::new(ErrorProcessor::new(store.clone(), cache_store.clone())),
        Arc::new(PerformanceProcessor::new(store.clone(), cache_store.clone())),
    ];
    let pipeline = Arc::new(IngestionPipeline::new(
        store.clone(),
        cache_store.clone(),
        processors,
        PipelineConfig {
            batch_size: config.batch_size,
            flush_interval: std::time::Duration::from_millis(config.flush_interval_ms),
            server_id: config.server_id.clone(),
            ..PipelineConfig::default()
        },
    ));

    // Buffered metric store and aggregation service
    let metrics_store = Arc::new(MetricsStore::new(
        store.clone(),
        cache_store.clone(),
        MetricsStoreConfig {
            flush_interval: std::time::Duration::from_millis(config.flush_interval_ms),
            ..MetricsStoreConfig::default()
        },
    ));
    let aggregator = Arc::new(AggregatorService::new(store.clone(), cache_store.clone()));

    // Ingestion queue: the transport layer enqueues, workers feed the core
    let queue = Arc::new(DurableQueue::new("ingest", cache_store.clone()));
    queue.register_handler(
        "event.track",
        Arc::new(EventHandler {
            pipeline: pipeline.clone(),
        }),
    );
    queue.register_handler(
        "metric.record",
        Arc::new(MetricHandler {
            metrics_store: metrics_store.clone(),
            aggregator: aggregator.clone(),
        }),
    );
    queue.start_processing(config.queue_workers);

    info!(
        server_id = %config.server_id,
        batch_size = config.batch_size,
        queue_workers = config.queue_workers,
        "Beacon engine running"
    );

    shutdown_signal().await;

    // Drain, never abort: stop workers, then flush the buffers
    info!("Shutting down...");
    queue.stop_processing().await;

    if let Err(e) = pipeline.shutdown().await {
        error!("Failed to drain event pipeline: {}", e);
    }
    if let Err(e) = metrics_store.stop().await {
        error!("Failed to drain metric buffers: {}", e);
    }

    let snapshot = beacon_telemetry::metrics().snapshot();
    info!(
        events_ingested = snapshot.events_ingested,
        events_persisted = snapshot.events_persisted,
        messages_processed = snapshot.messages_processed,
        messages_dead_lettered = snapshot.messages_dead_lettered,
        "Shutdown complete"
    );
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("BEACON")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested ClickHouse config from environment
    // The config crate's nested parsing doesn't work reliably with
    // underscored field names
    if let Ok(url) = std::env::var("BEACON_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("BEACON_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("BEACON_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("BEACON_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
