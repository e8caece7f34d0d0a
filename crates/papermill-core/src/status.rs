//! Read-only status queries and the view types they return.
//!
//! Everything here is side-effect free and built for sustained polling:
//! views are cloned snapshots, never references into live state, and the
//! reads share the store's read lock instead of contending with dispatch.
//! Task status is not public — a requester only ever sees their own tasks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AnalysisOutput, QueryError, SubmitterId, TaskFailure, TaskId, TaskRecord, TaskState,
};
use crate::queue::JobQueue;
use crate::store::TaskStore;

/// Per-state task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl StateCounts {
    pub fn bump(&mut self, state: TaskState) {
        match state {
            TaskState::Pending => self.pending += 1,
            TaskState::Running => self.running += 1,
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::TimedOut => self.timed_out += 1,
        }
    }
}

/// Snapshot of one task, as returned to its submitter.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub state: TaskState,
    pub progress: Option<String>,
    pub output: Option<AnalysisOutput>,
    pub failure: Option<TaskFailure>,

    /// 1-based position in the FIFO, present only while Pending.
    pub queue_position: Option<usize>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskView {
    fn from_record(record: TaskRecord, queue_position: Option<usize>) -> Self {
        Self {
            id: record.id,
            state: record.state,
            progress: record.progress,
            output: record.output,
            failure: record.failure,
            queue_position,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

/// One of the requester's own pending tasks, with its FIFO position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingPosition {
    pub task_id: TaskId,
    pub position: usize,
}

/// Global queue state plus the requester's own pending tasks. Derived on
/// demand; never another submitter's ids.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub queue_length: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub counts: StateCounts,
    pub your_tasks: Vec<PendingPosition>,
}

/// Read-only query surface backing the polling endpoint.
pub struct StatusService {
    store: Arc<dyn TaskStore>,
    queue: Arc<JobQueue>,
    max_concurrent: usize,
}

impl StatusService {
    pub fn new(store: Arc<dyn TaskStore>, queue: Arc<JobQueue>, max_concurrent: usize) -> Self {
        Self {
            store,
            queue,
            max_concurrent,
        }
    }

    /// Full state of one task, owner only.
    pub async fn task_view(
        &self,
        id: TaskId,
        requester: &SubmitterId,
    ) -> Result<TaskView, QueryError> {
        let record = self.store.get(id).await.ok_or(QueryError::NotFound)?;
        if record.submitter != *requester {
            return Err(QueryError::Forbidden);
        }

        let queue_position = if record.state == TaskState::Pending {
            self.queue.position_of(id).await
        } else {
            None
        };
        Ok(TaskView::from_record(record, queue_position))
    }

    /// Global counters plus the requester's own pending tasks.
    pub async fn snapshot(&self, requester: &SubmitterId) -> QueueSnapshot {
        let counts = self.store.counts().await;
        let queue_length = self.queue.pending_len().await;
        let your_tasks = self
            .queue
            .positions_for(requester)
            .await
            .into_iter()
            .map(|(task_id, position)| PendingPosition { task_id, position })
            .collect();

        QueueSnapshot {
            queue_length,
            running: counts.running,
            max_concurrent: self.max_concurrent,
            max_queue_size: self.queue.capacity(),
            counts,
            your_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentRef;
    use crate::store::InMemoryTaskStore;

    fn service(capacity: usize) -> (Arc<InMemoryTaskStore>, Arc<JobQueue>, StatusService) {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = Arc::new(JobQueue::new(store.clone() as Arc<dyn TaskStore>, capacity));
        let status = StatusService::new(
            store.clone() as Arc<dyn TaskStore>,
            Arc::clone(&queue),
            2,
        );
        (store, queue, status)
    }

    fn alice() -> SubmitterId {
        SubmitterId::new("alice")
    }

    fn bob() -> SubmitterId {
        SubmitterId::new("bob")
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (_store, _queue, status) = service(8);
        let err = status.task_view(TaskId::generate(), &alice()).await;
        assert_eq!(err.map(|_| ()), Err(QueryError::NotFound));
    }

    #[tokio::test]
    async fn foreign_task_is_forbidden() {
        let (_store, queue, status) = service(8);
        let id = queue.submit(bob(), DocumentRef::new("b1")).await.unwrap();

        let err = status.task_view(id, &alice()).await;
        assert_eq!(err.map(|_| ()), Err(QueryError::Forbidden));
    }

    #[tokio::test]
    async fn pending_view_carries_queue_position() {
        let (_store, queue, status) = service(8);
        queue.submit(bob(), DocumentRef::new("b1")).await.unwrap();
        let id = queue.submit(alice(), DocumentRef::new("a1")).await.unwrap();

        let view = status.task_view(id, &alice()).await.unwrap();
        assert_eq!(view.state, TaskState::Pending);
        assert_eq!(view.queue_position, Some(2));
        assert!(view.output.is_none());
    }

    #[tokio::test]
    async fn snapshot_reports_globals_but_only_own_ids() {
        let (_store, queue, status) = service(8);
        queue.submit(bob(), DocumentRef::new("b1")).await.unwrap();
        queue.submit(bob(), DocumentRef::new("b2")).await.unwrap();
        queue.submit(bob(), DocumentRef::new("b3")).await.unwrap();
        let a1 = queue.submit(alice(), DocumentRef::new("a1")).await.unwrap();

        let snapshot = status.snapshot(&alice()).await;
        assert_eq!(snapshot.queue_length, 4);
        assert_eq!(snapshot.counts.pending, 4);
        assert_eq!(snapshot.max_queue_size, 8);
        assert_eq!(snapshot.max_concurrent, 2);
        assert_eq!(
            snapshot.your_tasks,
            vec![PendingPosition {
                task_id: a1,
                position: 4
            }]
        );
    }

    #[tokio::test]
    async fn terminal_view_has_no_position() {
        let (_store, queue, status) = service(8);
        let id = queue.submit(alice(), DocumentRef::new("a1")).await.unwrap();

        let (_guard, mut shutdown) = tokio::sync::watch::channel(false);
        let lease = queue.claim(&mut shutdown).await.unwrap();
        lease
            .complete(AnalysisOutput::new(serde_json::json!({"ok": true})))
            .await;

        let view = status.task_view(id, &alice()).await.unwrap();
        assert_eq!(view.state, TaskState::Completed);
        assert_eq!(view.queue_position, None);
        assert!(view.output.is_some());
        assert!(view.completed_at.is_some());
    }

    #[tokio::test]
    async fn views_serialize_for_the_polling_layer() {
        let (_store, queue, status) = service(8);
        let id = queue.submit(alice(), DocumentRef::new("a1")).await.unwrap();

        let view = status.task_view(id, &alice()).await.unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["state"], serde_json::json!("Pending"));
        assert_eq!(json["queue_position"], serde_json::json!(1));

        let snapshot = status.snapshot(&alice()).await;
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["queue_length"], serde_json::json!(1));
    }
}
