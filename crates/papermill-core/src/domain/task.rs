//! Task model: state machine and record.
//!
//! Design:
//! - `TaskRecord` is the single source of truth for one task.
//! - All state transitions happen through the guarded methods here; they
//!   return `bool` so a write that arrives after the task reached a terminal
//!   state is a no-op instead of a corruption.
//! - The queue structure holds `TaskId`s only; records live in the store.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TaskFailure;
use super::ids::{SubmitterId, TaskId};

/// Opaque handle to the document a task will analyze.
///
/// Typically a stored-file identifier minted by the upload layer. The queue
/// never opens it; only the processing engine knows what it means.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque result of a completed analysis.
///
/// Carried as JSON so the polling layer can hand it straight to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput(serde_json::Value);

impl AnalysisOutput {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Task state.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending -> Running -> TimedOut (forced by the supervisor)
///
/// Completed/Failed/TimedOut are terminal; nothing leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Admitted, waiting for a worker slot.
    Pending,

    /// Currently being executed by a worker.
    Running,

    /// Analysis finished; `output` is set.
    Completed,

    /// Processing errored or panicked; `failure` is set.
    Failed,

    /// Deadline exceeded, declared by the supervisor; `failure` is set.
    TimedOut,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::TimedOut
        )
    }

    /// Is this task eligible for dispatch?
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskState::Pending)
    }
}

/// Metadata + payload handle for one submitted task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub submitter: SubmitterId,
    pub document: DocumentRef,
    pub state: TaskState,

    /// Coarse-grained current-step message, advisory only. Written by the
    /// worker while the task runs.
    pub progress: Option<String>,

    /// Set iff `state == Completed`. Write-once.
    pub output: Option<AnalysisOutput>,

    /// Set iff `state` is `Failed` or `TimedOut`.
    pub failure: Option<TaskFailure>,

    /// Audit timestamps (wall clock).
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Monotonic start instant; deadline arithmetic must not be subject to
    /// wall-clock jumps.
    pub started_instant: Option<Instant>,
}

impl TaskRecord {
    pub fn new(submitter: SubmitterId, document: DocumentRef) -> Self {
        Self {
            id: TaskId::generate(),
            submitter,
            document,
            state: TaskState::Pending,
            progress: None,
            output: None,
            failure: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            started_instant: None,
        }
    }

    /// Pending -> Running. Stamps the start timestamps.
    ///
    /// Returns false unless the task was Pending; the single dequeue path
    /// plus this guard is what makes "at most one runner per task" hold.
    pub fn begin_running(&mut self) -> bool {
        if !self.state.is_runnable() {
            return false;
        }
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
        self.started_instant = Some(Instant::now());
        true
    }

    /// Running -> Completed, recording the output.
    pub fn complete(&mut self, output: AnalysisOutput) -> bool {
        if self.state != TaskState::Running {
            return false;
        }
        self.state = TaskState::Completed;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
        true
    }

    /// Running -> Failed, recording the structured cause.
    pub fn fail(&mut self, failure: TaskFailure) -> bool {
        if self.state != TaskState::Running {
            return false;
        }
        self.state = TaskState::Failed;
        self.failure = Some(failure);
        self.completed_at = Some(Utc::now());
        true
    }

    /// Running -> TimedOut, forced by the supervisor.
    pub fn force_timeout(&mut self, failure: TaskFailure) -> bool {
        if self.state != TaskState::Running {
            return false;
        }
        self.state = TaskState::TimedOut;
        self.failure = Some(failure);
        self.completed_at = Some(Utc::now());
        true
    }

    /// Update the advisory progress message. Only meaningful while Running.
    pub fn set_progress(&mut self, message: String) -> bool {
        if self.state != TaskState::Running {
            return false;
        }
        self.progress = Some(message);
        true
    }

    /// Has this running task exceeded `timeout` since it started?
    pub fn overdue(&self, timeout: std::time::Duration) -> bool {
        self.state == TaskState::Running
            && self
                .started_instant
                .is_some_and(|started| started.elapsed() > timeout)
    }
}
