//! Metrics store tests: dual flush triggers, aggregate caching, and the
//! failure re-buffer path.

use std::sync::Arc;
use std::time::Duration;

use beacon_aggregate::{MetricsStore, MetricsStoreConfig};
use beacon_cache::{CacheStore, MemoryCache};
use beacon_core::{MetricAggregates, MetricKey};
use integration_tests::fixtures;
use integration_tests::mocks::MockStore;

fn build_store(
    mock: Arc<MockStore>,
    cache: Arc<MemoryCache>,
    max_buffer_size: usize,
    flush_interval: Duration,
) -> MetricsStore {
    MetricsStore::new(
        mock,
        cache,
        MetricsStoreConfig {
            flush_interval,
            max_buffer_size,
            ..MetricsStoreConfig::default()
        },
    )
}

const TS: i64 = 1_709_290_000_000;

#[tokio::test]
async fn reaching_max_buffer_size_flushes_the_key_immediately() {
    let mock = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let store = build_store(mock.clone(), cache.clone(), 5, Duration::from_secs(3600));

    for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
        store.store(fixtures::sample("cpu", v, TS)).await.unwrap();
    }

    // Flushed synchronously, nothing left behind
    assert_eq!(store.buffer_depth(), 0);
    assert_eq!(mock.metric_count(), 5);

    // Aggregates cached under the metric-minute key
    let key = MetricKey {
        name: "cpu".to_string(),
        minute: TS.div_euclid(60_000),
    };
    let cached = cache.get(&key.cache_key()).await.unwrap().unwrap();
    let aggregates: MetricAggregates = serde_json::from_str(&cached).unwrap();
    assert_eq!(aggregates.count, 5);
    assert_eq!(aggregates.sum, 150.0);
    assert_eq!(aggregates.min, 10.0);
    assert_eq!(aggregates.max, 50.0);
    assert_eq!(aggregates.avg, 30.0);
    assert_eq!(aggregates.p50, 30.0);
}

#[tokio::test]
async fn buffers_are_keyed_per_metric_per_minute() {
    let mock = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let store = build_store(mock.clone(), cache, 2, Duration::from_secs(3600));

    // Same metric, two different minutes; different metric, same minute
    store.store(fixtures::sample("cpu", 1.0, TS)).await.unwrap();
    store
        .store(fixtures::sample("cpu", 2.0, TS + 60_000))
        .await
        .unwrap();
    store.store(fixtures::sample("mem", 3.0, TS)).await.unwrap();

    // No key reached its threshold
    assert_eq!(store.buffer_depth(), 3);
    assert_eq!(mock.metric_count(), 0);

    // Second sample in the first cpu minute trips only that key
    store.store(fixtures::sample("cpu", 4.0, TS + 1)).await.unwrap();
    assert_eq!(mock.metric_count(), 2);
    assert_eq!(store.buffer_depth(), 2);
}

#[tokio::test]
async fn persistence_failure_rebuffers_the_captured_samples() {
    let mock = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let store = build_store(mock.clone(), cache, 3, Duration::from_secs(3600));

    mock.set_should_fail(true);
    store.store(fixtures::sample("cpu", 1.0, TS)).await.unwrap();
    store.store(fixtures::sample("cpu", 2.0, TS)).await.unwrap();
    // The third sample trips the threshold; the flush fails
    let result = store.store(fixtures::sample("cpu", 3.0, TS)).await;
    assert!(result.is_err());

    // No sample was lost
    assert_eq!(store.buffer_depth(), 3);
    assert_eq!(mock.metric_count(), 0);

    mock.set_should_fail(false);
    store.flush_all().await.unwrap();

    assert_eq!(store.buffer_depth(), 0);
    let values: Vec<f64> = mock.captured_metrics().iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
}

#[tokio::test(start_paused = true)]
async fn the_periodic_timer_flushes_all_keys() {
    let mock = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let store = build_store(mock.clone(), cache, 1000, Duration::from_secs(5));

    store.store(fixtures::sample("cpu", 1.0, TS)).await.unwrap();
    store.store(fixtures::sample("mem", 2.0, TS)).await.unwrap();
    assert_eq!(mock.metric_count(), 0);

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(mock.metric_count(), 2);
    assert_eq!(store.buffer_depth(), 0);
}

#[tokio::test]
async fn stop_cancels_the_timer_and_drains() {
    let mock = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let store = build_store(mock.clone(), cache, 1000, Duration::from_secs(3600));

    store
        .store_batch(vec![
            fixtures::sample("cpu", 1.0, TS),
            fixtures::sample("cpu", 2.0, TS),
        ])
        .await
        .unwrap();

    store.stop().await.unwrap();
    assert_eq!(mock.metric_count(), 2);
    assert_eq!(store.buffer_depth(), 0);
}

#[tokio::test]
async fn invalid_samples_are_rejected() {
    let mock = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let store = build_store(mock.clone(), cache, 1000, Duration::from_secs(3600));

    let result = store.store(fixtures::sample("", 1.0, TS)).await;
    assert!(result.is_err());
    assert_eq!(store.buffer_depth(), 0);
}

#[tokio::test]
async fn retention_deletes_report_the_matched_count() {
    let mock = MockStore::new();
    let cache = Arc::new(MemoryCache::new());
    let store = build_store(mock.clone(), cache, 2, Duration::from_secs(3600));

    // Two old samples flushed to durable storage
    let old = chrono::Utc::now().timestamp_millis() - 10 * 86_400_000;
    store.store(fixtures::sample("cpu", 1.0, old)).await.unwrap();
    store.store(fixtures::sample("cpu", 2.0, old)).await.unwrap();
    assert_eq!(mock.metric_count(), 2);

    let deleted = store.delete_old_metrics(7).await.unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(mock.metric_count(), 0);
}
