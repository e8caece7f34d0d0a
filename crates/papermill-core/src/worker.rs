//! Worker pool: N persistent executors pulling from the queue.
//!
//! Each worker loops claim -> process -> resolve. The processing call runs in
//! its own spawned task so a panic inside the engine surfaces as a `JoinError`
//! on this side of the boundary; the worker converts it to a `Failed` record
//! and keeps going. One bad document can never take a worker slot down.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::domain::TaskFailure;
use crate::processor::DocumentProcessor;
use crate::queue::{JobQueue, TaskLease};

/// Handle to the pool.
/// - `request_shutdown()` stops workers from taking new leases; in-flight
///   processing is not forcibly cancelled.
/// - `shutdown_and_join()` waits for all workers to wind down.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers against the queue.
    pub fn spawn(n: usize, queue: Arc<JobQueue>, processor: Arc<dyn DocumentProcessor>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let queue = Arc::clone(&queue);
            let processor = Arc::clone(&processor);
            let rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, queue, processor, rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Request shutdown for all workers.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<JobQueue>,
    processor: Arc<dyn DocumentProcessor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");
    while let Some(lease) = queue.claim(&mut shutdown_rx).await {
        run_one(worker_id, lease, Arc::clone(&processor)).await;
    }
    debug!(worker_id, "worker stopped");
}

/// Execute one claimed task and resolve its lease.
async fn run_one(worker_id: usize, lease: TaskLease, processor: Arc<dyn DocumentProcessor>) {
    let task_id = lease.id();
    let document = lease.document().clone();
    let ctx = lease.context();
    info!(worker_id, %task_id, "processing started");

    // Spawned so an engine panic lands here as a JoinError instead of
    // unwinding through the worker.
    let outcome = tokio::spawn(async move { processor.process(document, ctx).await }).await;

    match outcome {
        Ok(Ok(output)) => {
            if lease.complete(output).await {
                info!(worker_id, %task_id, "processing completed");
            } else {
                debug!(worker_id, %task_id, "late result discarded");
            }
        }
        Ok(Err(err)) => {
            warn!(worker_id, %task_id, error = %err, "processing failed");
            if !lease.fail(TaskFailure::processing(err.to_string())).await {
                debug!(worker_id, %task_id, "late failure discarded");
            }
        }
        Err(join_err) => {
            let message = panic_message(join_err);
            warn!(worker_id, %task_id, panic = %message, "processing panicked");
            if !lease.fail(TaskFailure::worker_panic(message)).await {
                debug!(worker_id, %task_id, "late panic report discarded");
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
