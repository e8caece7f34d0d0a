//! Task record store.
//!
//! Design:
//! - The records map is the single source of truth for task state; queue
//!   structures hold `TaskId`s only.
//! - [`TaskStore`] is a port: the in-memory implementation is the one this
//!   process runs, and the trait is the seam for swapping in a durable store
//!   later without touching the pool or the status service.
//! - Every mutation is a guarded transition (compare-and-swap on the state
//!   machine). Writers race — one worker, the supervisor, the sweeper — and
//!   the guards are what keep terminal states immutable.
//! - Reads clone records out of an `RwLock`, so sustained status polling
//!   shares a read lock and never blocks behind dispatch.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{AnalysisOutput, TaskFailure, TaskId, TaskRecord};
use crate::status::StateCounts;

/// Storage port for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a freshly admitted record. The task is visible to status
    /// queries from this point on.
    async fn insert(&self, record: TaskRecord);

    /// Snapshot of one record.
    async fn get(&self, id: TaskId) -> Option<TaskRecord>;

    /// Atomic Pending -> Running. Returns the post-transition snapshot, or
    /// `None` if the record is gone or was not Pending.
    async fn begin_running(&self, id: TaskId) -> Option<TaskRecord>;

    /// Running -> Completed. False means the write arrived late and was
    /// discarded.
    async fn complete(&self, id: TaskId, output: AnalysisOutput) -> bool;

    /// Running -> Failed.
    async fn fail(&self, id: TaskId, failure: TaskFailure) -> bool;

    /// Running -> TimedOut, on behalf of the supervisor.
    async fn force_timeout(&self, id: TaskId, failure: TaskFailure) -> bool;

    /// Update the advisory progress message (Running only).
    async fn set_progress(&self, id: TaskId, message: String) -> bool;

    /// Ids of running tasks that have exceeded `timeout` since dispatch.
    async fn overdue(&self, timeout: Duration) -> Vec<TaskId>;

    /// Per-state counters.
    async fn counts(&self) -> StateCounts;

    /// Drop records created before `cutoff`, regardless of state. Returns
    /// how many were removed.
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> usize;
}

/// In-memory store: `RwLock<HashMap>`, cloned reads.
#[derive(Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, record: TaskRecord) {
        let mut records = self.records.write().await;
        records.insert(record.id, record);
    }

    async fn get(&self, id: TaskId) -> Option<TaskRecord> {
        let records = self.records.read().await;
        records.get(&id).cloned()
    }

    async fn begin_running(&self, id: TaskId) -> Option<TaskRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id)?;
        if record.begin_running() {
            Some(record.clone())
        } else {
            None
        }
    }

    async fn complete(&self, id: TaskId, output: AnalysisOutput) -> bool {
        let mut records = self.records.write().await;
        records
            .get_mut(&id)
            .is_some_and(|record| record.complete(output))
    }

    async fn fail(&self, id: TaskId, failure: TaskFailure) -> bool {
        let mut records = self.records.write().await;
        records
            .get_mut(&id)
            .is_some_and(|record| record.fail(failure))
    }

    async fn force_timeout(&self, id: TaskId, failure: TaskFailure) -> bool {
        let mut records = self.records.write().await;
        records
            .get_mut(&id)
            .is_some_and(|record| record.force_timeout(failure))
    }

    async fn set_progress(&self, id: TaskId, message: String) -> bool {
        let mut records = self.records.write().await;
        records
            .get_mut(&id)
            .is_some_and(|record| record.set_progress(message))
    }

    async fn overdue(&self, timeout: Duration) -> Vec<TaskId> {
        let records = self.records.read().await;
        records
            .values()
            .filter(|record| record.overdue(timeout))
            .map(|record| record.id)
            .collect()
    }

    async fn counts(&self) -> StateCounts {
        let records = self.records.read().await;
        let mut counts = StateCounts::default();
        for record in records.values() {
            counts.bump(record.state);
        }
        counts
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.created_at >= cutoff);
        let purged = before - records.len();
        if purged > 0 {
            debug!(purged, "purged expired task records");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentRef, SubmitterId, TaskState};

    fn record() -> TaskRecord {
        TaskRecord::new(SubmitterId::new("alice"), DocumentRef::new("doc-1"))
    }

    fn output() -> AnalysisOutput {
        AnalysisOutput::new(serde_json::json!({"pages": 2}))
    }

    #[tokio::test]
    async fn insert_then_get_returns_a_snapshot() {
        let store = InMemoryTaskStore::new();
        let r = record();
        let id = r.id;
        store.insert(r).await;

        let snapshot = store.get(id).await.unwrap();
        assert_eq!(snapshot.state, TaskState::Pending);

        // Mutating the snapshot must not touch the stored record.
        let mut snapshot = snapshot;
        snapshot.begin_running();
        assert_eq!(store.get(id).await.unwrap().state, TaskState::Pending);
    }

    #[tokio::test]
    async fn begin_running_succeeds_exactly_once() {
        let store = InMemoryTaskStore::new();
        let r = record();
        let id = r.id;
        store.insert(r).await;

        assert!(store.begin_running(id).await.is_some());
        assert!(store.begin_running(id).await.is_none());
    }

    #[tokio::test]
    async fn late_writes_are_discarded() {
        let store = InMemoryTaskStore::new();
        let r = record();
        let id = r.id;
        store.insert(r).await;
        store.begin_running(id).await.unwrap();

        assert!(store.force_timeout(id, TaskFailure::timeout("deadline")).await);

        // The worker comes back later with a result; it must be a no-op.
        assert!(!store.complete(id, output()).await);
        assert!(!store.fail(id, TaskFailure::processing("late")).await);

        let snapshot = store.get(id).await.unwrap();
        assert_eq!(snapshot.state, TaskState::TimedOut);
        assert!(snapshot.output.is_none());
    }

    #[tokio::test]
    async fn overdue_only_lists_running_past_deadline() {
        let store = InMemoryTaskStore::new();
        let pending = record();
        let running = record();
        let running_id = running.id;
        store.insert(pending).await;
        store.insert(running).await;
        store.begin_running(running_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let overdue = store.overdue(Duration::from_millis(1)).await;
        assert_eq!(overdue, vec![running_id]);

        assert!(store.overdue(Duration::from_secs(60)).await.is_empty());
    }

    #[tokio::test]
    async fn counts_follow_the_state_machine() {
        let store = InMemoryTaskStore::new();
        let a = record();
        let b = record();
        let a_id = a.id;
        store.insert(a).await;
        store.insert(b).await;

        store.begin_running(a_id).await.unwrap();
        store.complete(a_id, output()).await;

        let counts = store.counts().await;
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 0);
        assert_eq!(counts.completed, 1);
    }

    #[tokio::test]
    async fn purge_drops_old_records_in_any_state() {
        let store = InMemoryTaskStore::new();
        let r = record();
        let id = r.id;
        store.insert(r).await;

        // Cutoff in the past keeps the record.
        let purged = store
            .purge_created_before(Utc::now() - chrono::Duration::hours(1))
            .await;
        assert_eq!(purged, 0);

        // Cutoff in the future drops it, Pending or not.
        let purged = store
            .purge_created_before(Utc::now() + chrono::Duration::hours(1))
            .await;
        assert_eq!(purged, 1);
        assert!(store.get(id).await.is_none());
    }
}
