//! Queue worker loops.
//!
//! Each worker is an independent polling loop over the same queue. Empty
//! polls sleep 1s; loop-level errors (store unreachable, poisoned
//! payloads) back off 5s so a failing dependency never spins hot.
//! Shutdown is cooperative: a worker mid-handler finishes that call
//! before observing its stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::queue::DurableQueue;

/// Idle sleep when every lane is empty.
const EMPTY_POLL_SLEEP: Duration = Duration::from_secs(1);
/// Backoff after a worker-loop error, to avoid a hot failure loop.
const ERROR_SLEEP: Duration = Duration::from_secs(5);

/// A running worker: its stop flag and join handle.
pub(crate) struct WorkerSlot {
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) handle: JoinHandle<()>,
}

impl DurableQueue {
    /// Spawns `concurrency` independent worker loops.
    pub fn start_processing(self: &Arc<Self>, concurrency: usize) {
        let mut workers = self.workers_mut();
        let base = workers.len();
        for worker_id in 0..concurrency {
            let running = Arc::new(AtomicBool::new(true));
            let handle = tokio::spawn(run_worker(self.clone(), base + worker_id, running.clone()));
            workers.push(WorkerSlot { running, handle });
        }
        info!(queue = %self.name(), concurrency, "Queue workers started");
    }

    /// Cooperatively stops every worker and waits for them to finish
    /// their current iteration (including any in-flight handler call).
    pub async fn stop_processing(&self) {
        let workers: Vec<WorkerSlot> = {
            let mut guard = self.workers_mut();
            guard.drain(..).collect()
        };

        for worker in &workers {
            worker.running.store(false, Ordering::Relaxed);
        }
        for worker in workers {
            let _ = worker.handle.await;
        }
        info!(queue = %self.name(), "Queue workers stopped");
    }

    /// Number of workers that have not been stopped.
    pub fn active_workers(&self) -> usize {
        self.workers_mut()
            .iter()
            .filter(|w| w.running.load(Ordering::Relaxed))
            .count()
    }
}

async fn run_worker(queue: Arc<DurableQueue>, worker_id: usize, running: Arc<AtomicBool>) {
    info!(queue = %queue.name(), worker_id, "Queue worker started");
    beacon_telemetry::metrics().queue_workers_active.inc();

    while running.load(Ordering::Relaxed) {
        match queue.process_one().await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(EMPTY_POLL_SLEEP).await,
            Err(e) => {
                error!(worker_id, error = %e, "Worker error");
                tokio::time::sleep(ERROR_SLEEP).await;
            }
        }
    }

    beacon_telemetry::metrics().queue_workers_active.dec();
    info!(queue = %queue.name(), worker_id, "Queue worker stopped");
}
