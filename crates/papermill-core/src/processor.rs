//! Processing-engine seam.
//!
//! The queue treats document analysis as an opaque long-running call behind
//! the [`DocumentProcessor`] trait. PDF parsing, OCR, table detection — none
//! of that lives in this crate; an implementation is injected at build time.
//!
//! Cancellation is cooperative: the supervisor flips a per-task signal and the
//! processing call is expected to poll it. Nothing here can forcibly stop
//! arbitrary native work.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::{AnalysisOutput, DocumentRef, TaskId};
use crate::store::TaskStore;

/// Error returned by a processing call.
///
/// Engines map their internal failures (parse errors, OCR faults, malformed
/// output) to a message here; the queue records it verbatim on the task.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProcessError(String);

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-task cancellation signal.
///
/// Backed by a `watch` channel whose sender lives with the task's lease; the
/// timeout supervisor flips it to true when the deadline passes.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Cheap check, suitable for polling between phases of work.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the task is cancelled.
    ///
    /// A dropped sender means the lease is already resolved; at that point the
    /// result will be discarded anyway, so it also resolves.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Handle for advisory progress updates.
///
/// Writes go through the store's Running-only guard, so a report that lands
/// after the task reached a terminal state is silently dropped.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn TaskStore>,
    task_id: TaskId,
}

impl ProgressReporter {
    pub(crate) fn new(store: Arc<dyn TaskStore>, task_id: TaskId) -> Self {
        Self { store, task_id }
    }

    pub async fn report(&self, message: impl Into<String>) {
        let message = message.into();
        if !self.store.set_progress(self.task_id, message).await {
            debug!(task_id = %self.task_id, "progress update after terminal state, dropped");
        }
    }
}

/// Everything a processing call may interact with besides the document:
/// the cancellation signal and the progress channel.
pub struct TaskContext {
    cancel: CancelSignal,
    progress: ProgressReporter,
}

impl TaskContext {
    pub(crate) fn new(cancel: CancelSignal, progress: ProgressReporter) -> Self {
        Self { cancel, progress }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&mut self) {
        self.cancel.cancelled().await;
    }

    /// A standalone clone of the cancel signal, e.g. to `select!` against.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Report a coarse-grained phase change ("running OCR", "mapping
    /// columns"). Advisory only; never used for correctness.
    pub async fn report_progress(&self, message: impl Into<String>) {
        self.progress.report(message).await;
    }
}

/// The external analysis engine invoked by each worker.
///
/// Contract:
/// - Must be safe to call from all workers concurrently (no shared mutable
///   state across calls).
/// - SHOULD poll `ctx` for cancellation between phases; if it does not, the
///   worker slot stays occupied until the call finally returns, after which
///   the late result is discarded.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    async fn process(
        &self,
        document: DocumentRef,
        ctx: TaskContext,
    ) -> Result<AnalysisOutput, ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_signal_observes_the_sender() {
        let (tx, rx) = watch::channel(false);
        let mut signal = CancelSignal::new(rx);

        assert!(!signal.is_cancelled());
        tx.send(true).unwrap();
        assert!(signal.is_cancelled());

        // Already-cancelled signal resolves immediately.
        tokio::time::timeout(std::time::Duration::from_millis(100), signal.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_resolves_when_sender_drops() {
        let (tx, rx) = watch::channel(false);
        let mut signal = CancelSignal::new(rx);
        drop(tx);

        tokio::time::timeout(std::time::Duration::from_millis(100), signal.cancelled())
            .await
            .unwrap();
    }
}
