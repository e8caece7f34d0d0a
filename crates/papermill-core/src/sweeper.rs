//! Retention sweep.
//!
//! Tasks are kept after they finish so submitters can poll the result, but
//! not forever: a background sweep purges records older than the retention
//! window, regardless of state. Cleanup belongs here, not to submitters.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::TaskStore;

pub struct RetentionSweeper;

impl RetentionSweeper {
    /// Spawn the sweep loop. It stops when `shutdown` flips.
    pub fn spawn(
        store: Arc<dyn TaskStore>,
        retention: Duration,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            debug!(?retention, ?interval, "retention sweeper started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        // An out-of-range window (from_std fails only past
                        // ~292 million years) just means "never purge".
                        let Ok(window) = chrono::Duration::from_std(retention) else {
                            continue;
                        };
                        let cutoff = Utc::now() - window;
                        let purged = store.purge_created_before(cutoff).await;
                        if purged > 0 {
                            info!(purged, "retention sweep removed expired tasks");
                        }
                    }
                }
            }
            debug!("retention sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentRef, SubmitterId, TaskRecord};
    use crate::store::InMemoryTaskStore;

    #[tokio::test]
    async fn sweeper_purges_expired_records() {
        let store = Arc::new(InMemoryTaskStore::new());
        let mut old = TaskRecord::new(SubmitterId::new("alice"), DocumentRef::new("old"));
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        let old_id = old.id;
        store.insert(old).await;

        let fresh = TaskRecord::new(SubmitterId::new("alice"), DocumentRef::new("fresh"));
        let fresh_id = fresh.id;
        store.insert(fresh).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = RetentionSweeper::spawn(
            store.clone() as Arc<dyn TaskStore>,
            Duration::from_secs(3600),
            Duration::from_millis(10),
            shutdown_rx,
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.get(old_id).await.is_some() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expired record was never purged");

        assert!(store.get(fresh_id).await.is_some());

        let _ = shutdown_tx.send(true);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let store = Arc::new(InMemoryTaskStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = RetentionSweeper::spawn(
            store as Arc<dyn TaskStore>,
            Duration::from_secs(3600),
            Duration::from_millis(10),
            shutdown_rx,
        );

        let _ = shutdown_tx.send(true);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
