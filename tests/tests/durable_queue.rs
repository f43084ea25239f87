//! Durable queue behavior through the worker loop: lane ordering,
//! dead-lettering, and DLQ reprocessing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use beacon_cache::MemoryCache;
use beacon_core::{Error, QueueMessage, Result};
use beacon_queue::{DurableQueue, EnqueueOptions, MessageHandler};

struct OrderRecorder {
    lanes: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageHandler for OrderRecorder {
    async fn handle(&self, message: &QueueMessage) -> Result<()> {
        let lane = message.payload["lane"].as_str().unwrap_or("?").to_string();
        self.lanes.lock().push(lane);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn a_single_worker_observes_strict_lane_order() {
    let queue = Arc::new(DurableQueue::new("order", Arc::new(MemoryCache::new())));
    let recorder = Arc::new(OrderRecorder {
        lanes: Mutex::new(Vec::new()),
    });
    queue.register_handler("job", recorder.clone());

    queue
        .enqueue("job", json!({"lane": "immediate"}), EnqueueOptions::default())
        .await
        .unwrap();
    queue
        .enqueue(
            "job",
            json!({"lane": "priority"}),
            EnqueueOptions::with_priority(10.0),
        )
        .await
        .unwrap();
    queue
        .enqueue(
            "job",
            json!({"lane": "delayed"}),
            EnqueueOptions::delayed(Duration::ZERO),
        )
        .await
        .unwrap();

    queue.start_processing(1);
    tokio::time::sleep(Duration::from_secs(3)).await;
    queue.stop_processing().await;

    assert_eq!(
        *recorder.lanes.lock(),
        vec!["delayed", "priority", "immediate"]
    );
}

/// Fails until `healthy` flips, then succeeds.
struct FlakyHandler {
    healthy: AtomicBool,
    attempts: Mutex<Vec<u32>>,
}

#[async_trait]
impl MessageHandler for FlakyHandler {
    async fn handle(&self, message: &QueueMessage) -> Result<()> {
        self.attempts.lock().push(message.retries);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::handler(message.id.to_string(), "downstream down"))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn failed_message_dead_letters_then_reprocesses_cleanly() {
    let queue = Arc::new(
        DurableQueue::new("flaky", Arc::new(MemoryCache::new())).with_max_retries(1),
    );
    let handler = Arc::new(FlakyHandler {
        healthy: AtomicBool::new(false),
        attempts: Mutex::new(Vec::new()),
    });
    queue.register_handler("job", handler.clone());

    queue
        .enqueue("job", json!({"n": 1}), EnqueueOptions::default())
        .await
        .unwrap();

    queue.start_processing(1);
    tokio::time::sleep(Duration::from_secs(3)).await;

    // One attempt, then straight to the sink (budget of 1)
    let depths = queue.queue_depths().await.unwrap();
    assert_eq!(depths.dead_letter, 1);
    assert_eq!(depths.immediate + depths.priority + depths.delayed, 0);
    assert_eq!(handler.attempts.lock().len(), 1);

    // Operator action: recover the downstream, replay the sink
    handler.healthy.store(true, Ordering::SeqCst);
    let moved = queue.reprocess_dlq().await.unwrap();
    assert_eq!(moved, 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    queue.stop_processing().await;

    let depths = queue.queue_depths().await.unwrap();
    assert_eq!(depths.dead_letter, 0);
    assert_eq!(depths.immediate, 0);

    // The replayed message carried its retry count with it
    assert_eq!(*handler.attempts.lock(), vec![0, 1]);
}

#[tokio::test(start_paused = true)]
async fn unroutable_messages_bypass_workers_straight_to_dlq() {
    let queue = Arc::new(DurableQueue::new("lost", Arc::new(MemoryCache::new())));
    queue.register_handler(
        "known",
        Arc::new(OrderRecorder {
            lanes: Mutex::new(Vec::new()),
        }),
    );

    queue
        .enqueue("unknown", json!({}), EnqueueOptions::default())
        .await
        .unwrap();

    queue.start_processing(2);
    tokio::time::sleep(Duration::from_secs(3)).await;
    queue.stop_processing().await;

    let depths = queue.queue_depths().await.unwrap();
    assert_eq!(depths.dead_letter, 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_workers_process_each_message_exactly_once() {
    let queue = Arc::new(DurableQueue::new("fanout", Arc::new(MemoryCache::new())));
    let recorder = Arc::new(OrderRecorder {
        lanes: Mutex::new(Vec::new()),
    });
    queue.register_handler("job", recorder.clone());

    for i in 0..20 {
        queue
            .enqueue("job", json!({"lane": format!("m{}", i)}), EnqueueOptions::default())
            .await
            .unwrap();
    }

    queue.start_processing(4);
    tokio::time::sleep(Duration::from_secs(5)).await;
    queue.stop_processing().await;

    let mut seen = recorder.lanes.lock().clone();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 20);
}
