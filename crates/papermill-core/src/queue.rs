//! Admission control, FIFO ordering, and lease claim.
//!
//! Design:
//! - `submit` is the only backpressure point: once the pending backlog hits
//!   the configured ceiling, new submissions are rejected outright.
//! - The pending deque holds `(TaskId, SubmitterId)` pairs; records live in
//!   the store. Position queries walk the deque and never read other
//!   submitters' records.
//! - `claim` pops FIFO and performs the atomic Pending -> Running transition
//!   through the store guard. An id leaves the deque exactly once, so no two
//!   workers can ever run the same task.
//! - Workers park on a `Notify` while the deque is empty; `submit` wakes one.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, info};

use crate::domain::{
    AnalysisOutput, DocumentRef, SubmitError, SubmitterId, TaskFailure, TaskId, TaskRecord,
};
use crate::processor::{CancelSignal, ProgressReporter, TaskContext};
use crate::store::TaskStore;

type CancelMap = Mutex<HashMap<TaskId, watch::Sender<bool>>>;

/// Admission gate + FIFO queue + cancel-signal registry.
pub struct JobQueue {
    store: Arc<dyn TaskStore>,
    capacity: usize,
    pending: Mutex<VecDeque<(TaskId, SubmitterId)>>,
    notify: Notify,
    cancels: Arc<CancelMap>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn TaskStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity,
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit a task or reject it with `QueueFull`.
    ///
    /// The record is inserted before the admission lock is released, so the
    /// task is visible to status queries as Pending the moment this returns,
    /// and the ceiling check stays exact under concurrent submission.
    pub async fn submit(
        &self,
        submitter: SubmitterId,
        document: DocumentRef,
    ) -> Result<TaskId, SubmitError> {
        let mut pending = self.pending.lock().await;
        if pending.len() >= self.capacity {
            debug!(%submitter, capacity = self.capacity, "submission rejected, queue full");
            return Err(SubmitError::QueueFull {
                capacity: self.capacity,
            });
        }

        let record = TaskRecord::new(submitter.clone(), document);
        let id = record.id;
        self.store.insert(record).await;
        pending.push_back((id, submitter));
        drop(pending);

        self.notify.notify_one();
        info!(task_id = %id, "task admitted");
        Ok(id)
    }

    /// Claim the next task in FIFO order, waiting if none is ready.
    ///
    /// Returns `None` once `shutdown` flips; in-flight work is unaffected,
    /// the caller just stops getting new leases.
    pub async fn claim(&self, shutdown: &mut watch::Receiver<bool>) -> Option<TaskLease> {
        loop {
            if *shutdown.borrow() {
                return None;
            }

            let next = {
                let mut pending = self.pending.lock().await;
                let next = pending.pop_front();
                // Notify stores at most one permit, so a submit burst can
                // leave fewer permits than queued tasks. Chain the wakeup.
                if next.is_some() && !pending.is_empty() {
                    self.notify.notify_one();
                }
                next
            };

            let Some((id, _)) = next else {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    changed = shutdown.changed() => {
                        // A closed channel means the pool handle is gone;
                        // treat it the same as an explicit shutdown.
                        if changed.is_err() {
                            return None;
                        }
                    }
                }
                continue;
            };

            match self.store.begin_running(id).await {
                Some(record) => {
                    let (tx, rx) = watch::channel(false);
                    self.cancels.lock().await.insert(id, tx);
                    debug!(task_id = %id, "task dispatched");
                    return Some(TaskLease {
                        id,
                        document: record.document,
                        cancel: CancelSignal::new(rx),
                        store: Arc::clone(&self.store),
                        cancels: Arc::clone(&self.cancels),
                    });
                }
                None => {
                    // Record purged while queued; drop the stale entry.
                    debug!(task_id = %id, "stale queue entry skipped");
                }
            }
        }
    }

    /// Fire the cancel signal of a running task (supervisor use).
    pub async fn cancel(&self, id: TaskId) {
        let cancels = self.cancels.lock().await;
        if let Some(tx) = cancels.get(&id) {
            let _ = tx.send(true);
        }
    }

    /// Current pending backlog length.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// 1-based queue positions of one submitter's pending tasks, in FIFO
    /// order. Other submitters' entries contribute to the position numbers
    /// but are never returned.
    pub async fn positions_for(&self, submitter: &SubmitterId) -> Vec<(TaskId, usize)> {
        let pending = self.pending.lock().await;
        pending
            .iter()
            .enumerate()
            .filter(|(_, (_, owner))| owner == submitter)
            .map(|(idx, (id, _))| (*id, idx + 1))
            .collect()
    }

    /// 1-based position of a single pending task, if it is still queued.
    pub async fn position_of(&self, id: TaskId) -> Option<usize> {
        let pending = self.pending.lock().await;
        pending
            .iter()
            .position(|(queued, _)| *queued == id)
            .map(|idx| idx + 1)
    }
}

/// A claimed task. The worker owns the lease and must resolve it with
/// `complete` or `fail`; both return false when the write arrived after the
/// task already reached a terminal state (e.g. a supervisor timeout) and was
/// discarded.
pub struct TaskLease {
    id: TaskId,
    document: DocumentRef,
    cancel: CancelSignal,
    store: Arc<dyn TaskStore>,
    cancels: Arc<CancelMap>,
}

impl TaskLease {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    /// Context handed to the processing call: cancel signal + progress
    /// channel.
    pub fn context(&self) -> TaskContext {
        TaskContext::new(
            self.cancel.clone(),
            ProgressReporter::new(Arc::clone(&self.store), self.id),
        )
    }

    pub async fn complete(self, output: AnalysisOutput) -> bool {
        let applied = self.store.complete(self.id, output).await;
        self.release().await;
        applied
    }

    pub async fn fail(self, failure: TaskFailure) -> bool {
        let applied = self.store.fail(self.id, failure).await;
        self.release().await;
        applied
    }

    /// Drop the cancel-signal registration once the underlying call has
    /// actually returned, however late.
    async fn release(&self) {
        self.cancels.lock().await.remove(&self.id);
    }
}
