//! End-to-end ingestion pipeline tests: batch persistence, processor
//! plugins, rolling counters, and live-update publishing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use beacon_cache::{CacheStore, MemoryCache};
use beacon_core::{EnrichedEvent, Error, EventType, Result};
use beacon_pipeline::processors::error::CRITICAL_ALERT_CHANNEL;
use beacon_pipeline::{
    ErrorProcessor, IngestionPipeline, PerformanceProcessor, PipelineConfig, Processor,
    REALTIME_CHANNEL,
};
use integration_tests::fixtures;
use integration_tests::mocks::MockStore;

fn build_pipeline(
    store: Arc<MockStore>,
    cache: Arc<MemoryCache>,
    batch_size: usize,
) -> IngestionPipeline {
    let processors: Vec<Arc<dyn Processor>> = vec![
        Arc::new(ErrorProcessor::new(store.clone(), cache.clone())),
        Arc::new(PerformanceProcessor::new(store.clone(), cache.clone())),
    ];

    IngestionPipeline::new(
        store,
        cache,
        processors,
        PipelineConfig {
            batch_size,
            // Timer out of the way; tests drive flushes explicitly
            flush_interval: Duration::from_secs(3600),
            server_id: "test-node".to_string(),
            ..PipelineConfig::default()
        },
    )
}

#[tokio::test]
async fn full_batch_persists_counts_and_publishes() {
    let store = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let mut updates = cache.subscribe(REALTIME_CHANNEL);

    let pipeline = build_pipeline(store.clone(), cache.clone(), 3);

    for _ in 0..3 {
        pipeline.process_event(fixtures::pageview()).await.unwrap();
    }

    // Third add filled the batch and flushed synchronously
    assert_eq!(store.event_count(), 3);
    assert_eq!(pipeline.queue_status().queue_size, 0);

    let persisted = store.captured_events();
    assert!(persisted
        .iter()
        .all(|e| e.metadata_str("server_id") == Some("test-node")));

    // One live update per event in the batch
    for _ in 0..3 {
        let raw = updates.recv().await.unwrap();
        let msg: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg["type"], "event");
        assert_eq!(msg["data"]["type"], "pageview");
    }

    // Rolling daily counter for the event type
    let key = format!("metrics:pageview:{}", Utc::now().format("%Y-%m-%d"));
    let counters = cache.hash_get_all(&key).await.unwrap();
    assert_eq!(counters.get("count"), Some(&3.0));
}

#[tokio::test]
async fn error_processor_persists_counts_and_alerts() {
    let store = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let mut alerts = cache.subscribe(CRITICAL_ALERT_CHANNEL);

    let pipeline = build_pipeline(store.clone(), cache.clone(), 1);

    pipeline
        .process_event(fixtures::error_event("DATABASE_ERROR", "connection refused"))
        .await
        .unwrap();

    let errors = store.captured_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, "DATABASE_ERROR");
    assert_eq!(errors[0].message, "connection refused");
    assert_eq!(errors[0].user_id.as_deref(), Some("user-1"));

    let counters = cache.hash_get_all("errors:DATABASE_ERROR").await.unwrap();
    assert_eq!(counters.get("count"), Some(&1.0));

    // Critical error type published an alert
    let raw = alerts.recv().await.unwrap();
    let alert: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(alert["type"], "critical_error");
    assert_eq!(alert["severity"], "high");
}

#[tokio::test]
async fn non_critical_errors_do_not_alert() {
    let store = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let mut alerts = cache.subscribe(CRITICAL_ALERT_CHANNEL);

    let pipeline = build_pipeline(store.clone(), cache.clone(), 1);
    pipeline
        .process_event(fixtures::error_event("TIMEOUT", "slow upstream"))
        .await
        .unwrap();

    assert_eq!(store.captured_errors().len(), 1);
    assert!(alerts.try_recv().is_err());
}

#[tokio::test]
async fn performance_processor_tracks_endpoints_and_slow_requests() {
    let store = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let pipeline = build_pipeline(store.clone(), cache.clone(), 2);

    pipeline
        .process_event(fixtures::api_call("/reports", 1500.0, 200))
        .await
        .unwrap();
    pipeline
        .process_event(fixtures::api_call("/health", 50.0, 503))
        .await
        .unwrap();

    // Only the over-threshold request is persisted individually
    let slow = store.captured_slow_requests();
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0].endpoint, "/reports");
    assert_eq!(slow[0].duration, 1500.0);

    let counters = cache.hash_get_all("perf:/health:GET").await.unwrap();
    assert_eq!(counters.get("count"), Some(&1.0));
    assert_eq!(counters.get("errors"), Some(&1.0));

    let counters = cache.hash_get_all("perf:/reports:GET").await.unwrap();
    assert_eq!(counters.get("total_duration"), Some(&1500.0));
    assert_eq!(counters.get("errors"), None);
}

#[tokio::test]
async fn failed_persist_rebuffers_and_later_flush_recovers() {
    let store = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let pipeline = build_pipeline(store.clone(), cache.clone(), 10);

    pipeline.process_event(fixtures::pageview()).await.unwrap();
    pipeline.process_event(fixtures::pageview()).await.unwrap();

    store.set_should_fail(true);
    assert!(pipeline.flush().await.is_err());

    // Nothing persisted, nothing lost
    assert_eq!(store.event_count(), 0);
    assert_eq!(pipeline.queue_status().queue_size, 2);

    store.set_should_fail(false);
    pipeline.flush().await.unwrap();

    // The retried batch lands exactly once
    assert_eq!(store.event_count(), 2);
    assert_eq!(pipeline.queue_status().queue_size, 0);
}

struct FailingProcessor;

#[async_trait]
impl Processor for FailingProcessor {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn should_process(&self, _event: &EnrichedEvent) -> bool {
        true
    }

    async fn process(&self, _event: &EnrichedEvent) -> Result<()> {
        Err(Error::processor("failing", "always fails"))
    }
}

#[tokio::test]
async fn processor_failures_never_abort_the_batch() {
    let store = MockStore::new();
    let cache = Arc::new(MemoryCache::new());

    let processors: Vec<Arc<dyn Processor>> = vec![
        Arc::new(FailingProcessor),
        Arc::new(ErrorProcessor::new(store.clone(), cache.clone())),
    ];
    let pipeline = IngestionPipeline::new(
        store.clone(),
        cache.clone(),
        processors,
        PipelineConfig {
            batch_size: 1,
            flush_interval: Duration::from_secs(3600),
            server_id: "test-node".to_string(),
            ..PipelineConfig::default()
        },
    );

    pipeline
        .process_event(fixtures::error_event("TIMEOUT", "x"))
        .await
        .unwrap();

    // The batch persisted and the later processor still ran
    assert_eq!(store.event_count(), 1);
    assert_eq!(store.captured_errors().len(), 1);
}

#[tokio::test]
async fn invalid_events_are_rejected_before_batching() {
    let store = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let pipeline = build_pipeline(store.clone(), cache.clone(), 10);

    let mut event = beacon_core::Event::new(EventType::Click);
    event.user_id = Some("x".repeat(200));

    assert!(pipeline.process_event(event).await.is_err());
    assert_eq!(pipeline.queue_status().queue_size, 0);
}

#[tokio::test]
async fn shutdown_drains_the_buffer() {
    let store = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let pipeline = build_pipeline(store.clone(), cache.clone(), 100);

    pipeline.process_event(fixtures::pageview()).await.unwrap();
    assert_eq!(store.event_count(), 0);

    pipeline.shutdown().await.unwrap();
    assert_eq!(store.event_count(), 1);
}
