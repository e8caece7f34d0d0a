//! Error taxonomy.
//!
//! Two very different families live here:
//! - Synchronous API errors (`SubmitError`, `QueryError`) returned directly to
//!   the caller at submission/query time.
//! - `TaskFailure`, which is not an error type in the `Result` sense at all:
//!   it is data recorded on the task and surfaced through polling. Task-level
//!   failures never cross the API boundary as errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Admission-time rejection. No task record is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The pending backlog hit the configured ceiling. Callers should retry
    /// later; this is the only backpressure mechanism.
    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
}

/// Query-time errors for the status service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Unknown task id: never admitted, or already purged by retention.
    #[error("task not found")]
    NotFound,

    /// The task exists but belongs to another submitter. Task status is not
    /// public.
    #[error("task belongs to another submitter")]
    Forbidden,
}

/// Why a task ended in `Failed` or `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The processing engine returned an error.
    Processing,

    /// The processing call panicked; caught at the worker boundary so the
    /// pool itself keeps running.
    WorkerPanic,

    /// The timeout supervisor declared the deadline exceeded. Distinct from
    /// `Processing` so callers can tell "ran too long" from "errored".
    Timeout,
}

/// Structured cause recorded on a failed or timed-out task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn processing(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Processing,
            message: message.into(),
        }
    }

    pub fn worker_panic(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::WorkerPanic,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_serializes_snake_case() {
        let s = serde_json::to_string(&FailureKind::WorkerPanic).unwrap();
        assert_eq!(s, "\"worker_panic\"");
    }

    #[test]
    fn submit_error_mentions_capacity() {
        let err = SubmitError::QueueFull { capacity: 8 };
        assert!(err.to_string().contains('8'));
    }
}
