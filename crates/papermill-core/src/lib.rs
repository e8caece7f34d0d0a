//! papermill-core
//!
//! Bounded-concurrency job queue for long-running document analysis.
//!
//! # Module map
//! - **domain**: ids, the task state machine, and the error taxonomy
//! - **config**: static knobs (pool size, queue ceiling, timeout, retention)
//! - **store**: task record store (port + in-memory implementation)
//! - **queue**: admission control, FIFO ordering, and lease claim
//! - **processor**: the seam the external analysis engine plugs into
//! - **worker**: the fixed-size worker pool
//! - **supervisor**: deadline enforcement for running tasks
//! - **sweeper**: retention-based cleanup of old records
//! - **status**: read-only views for the polling endpoint
//! - **app**: builder + facade wiring it all together
//!
//! The queue never looks inside a document. Analysis is an opaque call behind
//! [`DocumentProcessor`]; everything in this crate is about admitting,
//! ordering, bounding, timing out, and reporting that call.

pub mod app;
pub mod config;
pub mod domain;
pub mod processor;
pub mod queue;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod sweeper;
pub mod worker;

pub use app::{App, AppBuilder, BuildError};
pub use config::{ConfigError, QueueConfig};
pub use domain::{
    AnalysisOutput, DocumentRef, FailureKind, QueryError, SubmitError, SubmitterId, TaskFailure,
    TaskId, TaskState,
};
pub use processor::{CancelSignal, DocumentProcessor, ProcessError, TaskContext};
pub use queue::{JobQueue, TaskLease};
pub use status::{PendingPosition, QueueSnapshot, StateCounts, TaskView};
pub use store::{InMemoryTaskStore, TaskStore};
pub use supervisor::TimeoutSupervisor;
pub use sweeper::RetentionSweeper;
pub use worker::WorkerPool;
