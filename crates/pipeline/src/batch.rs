//! Generic size/time-triggered batching.
//!
//! Two independent triggers race to flush the buffer: `add` flushes
//! synchronously when the buffer reaches `batch_size`, and a background
//! timer flushes on an interval while the buffer is non-empty. Flushes
//! are mutually exclusive per instance; a contended trigger is a no-op.
//! New items are accepted during an in-flight flush and accumulate in the
//! fresh buffer for the next trigger. A failed flush prepends the
//! captured batch back onto the current buffer, so nothing is lost and
//! nothing is duplicated beyond the retried batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::error;

use beacon_core::Result;
use beacon_telemetry::metrics;

/// The injected flush function. Receives each captured batch in FIFO
/// order; a batch is re-delivered only after the sink reported failure.
#[async_trait]
pub trait BatchSink<T>: Send + Sync {
    async fn process(&self, batch: &[T]) -> Result<()>;
}

struct Inner<T> {
    batch_size: usize,
    buffer: Mutex<Vec<T>>,
    /// Mutual exclusion between the size trigger, the timer trigger, and
    /// explicit flushes. try_lock keeps a contended trigger a no-op
    /// instead of serializing the whole pipeline.
    flush_lock: tokio::sync::Mutex<()>,
    processing: AtomicBool,
    sink: Arc<dyn BatchSink<T>>,
}

impl<T: Send + Sync> Inner<T> {
    async fn flush(&self) -> Result<()> {
        let Ok(_guard) = self.flush_lock.try_lock() else {
            return Ok(());
        };

        let captured: Vec<T> = std::mem::take(&mut *self.buffer.lock());
        if captured.is_empty() {
            return Ok(());
        }

        self.processing.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.sink.process(&captured).await;
        metrics()
            .batch_flush_latency_ms
            .observe(started.elapsed().as_millis() as u64);
        self.processing.store(false, Ordering::SeqCst);

        if let Err(e) = result {
            // Restore the captured batch ahead of anything added since
            let mut buffer = self.buffer.lock();
            let mut restored = captured;
            restored.extend(buffer.drain(..));
            *buffer = restored;
            metrics().batch_queue_depth.set(buffer.len() as u64);
            return Err(e);
        }

        metrics().batch_queue_depth.set(self.buffer.lock().len() as u64);
        Ok(())
    }
}

/// Size/time-triggered batcher around an injected sink.
pub struct BatchProcessor<T> {
    inner: Arc<Inner<T>>,
    shutdown: Arc<Notify>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> BatchProcessor<T> {
    /// Creates the processor and starts its flush timer.
    pub fn new(batch_size: usize, flush_interval: Duration, sink: Arc<dyn BatchSink<T>>) -> Self {
        let inner = Arc::new(Inner {
            batch_size,
            buffer: Mutex::new(Vec::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            processing: AtomicBool::new(false),
            sink,
        });
        let shutdown = Arc::new(Notify::new());

        let timer = {
            let inner = inner.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(flush_interval);
                ticker.tick().await; // first tick completes immediately
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let pending = !inner.buffer.lock().is_empty()
                                && !inner.processing.load(Ordering::SeqCst);
                            if pending {
                                if let Err(e) = inner.flush().await {
                                    error!(error = %e, "Timer-triggered flush failed");
                                }
                            }
                        }
                        _ = shutdown.notified() => break,
                    }
                }
            })
        };

        Self {
            inner,
            shutdown,
            timer: Mutex::new(Some(timer)),
        }
    }

    /// Appends an item, flushing synchronously once the buffer reaches
    /// the batch size. Items added while a flush is in-flight land in the
    /// fresh buffer and go out on the next trigger.
    pub async fn add(&self, item: T) -> Result<()> {
        let should_flush = {
            let mut buffer = self.inner.buffer.lock();
            buffer.push(item);
            buffer.len() >= self.inner.batch_size
        };

        if should_flush {
            self.inner.flush().await?;
        }
        Ok(())
    }

    /// Appends a batch of items through `add`.
    pub async fn add_many(&self, items: Vec<T>) -> Result<()> {
        for item in items {
            self.add(item).await?;
        }
        Ok(())
    }

    /// Flushes the current buffer. A no-op when another flush is
    /// in-flight or the buffer is empty.
    pub async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    /// Stops the timer and performs one final flush, propagating its
    /// failure.
    pub async fn stop(&self) -> Result<()> {
        self.shutdown.notify_one();
        if let Some(timer) = self.timer.lock().take() {
            let _ = timer.await;
        }
        self.inner.flush().await
    }

    /// Current buffer depth.
    pub fn queue_size(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Whether a flush is in-flight.
    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst)
    }
}
