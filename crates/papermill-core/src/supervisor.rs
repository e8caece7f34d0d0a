//! Timeout supervisor.
//!
//! Scans running tasks on a fixed tick and forces `Running -> TimedOut` on
//! any that outlived the deadline, independent of what the worker is doing.
//! The transition is visible to pollers immediately; the underlying engine
//! call is only cancelled cooperatively, via the task's cancel signal. If the
//! engine ignores the signal, the worker slot stays busy until the call
//! returns, and the late result hits the terminal-state guard and vanishes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::TaskFailure;
use crate::queue::JobQueue;
use crate::store::TaskStore;

pub struct TimeoutSupervisor;

impl TimeoutSupervisor {
    /// Spawn the supervision loop. It stops when `shutdown` flips.
    pub fn spawn(
        store: Arc<dyn TaskStore>,
        queue: Arc<JobQueue>,
        timeout: Duration,
        tick: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            debug!(?timeout, ?tick, "timeout supervisor started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        sweep_overdue(&store, &queue, timeout).await;
                    }
                }
            }
            debug!("timeout supervisor stopped");
        })
    }
}

async fn sweep_overdue(store: &Arc<dyn TaskStore>, queue: &Arc<JobQueue>, timeout: Duration) {
    for id in store.overdue(timeout).await {
        let failure = TaskFailure::timeout(format!(
            "exceeded the {}s processing deadline",
            timeout.as_secs()
        ));
        if store.force_timeout(id, failure).await {
            warn!(task_id = %id, "task exceeded deadline, marked timed out");
            // Best effort: the engine decides whether it listens.
            queue.cancel(id).await;
        }
    }
}
