//! Domain model (ids, task state machine, error taxonomy).

pub mod errors;
pub mod ids;
pub mod task;

pub use errors::{FailureKind, QueryError, SubmitError, TaskFailure};
pub use ids::{SubmitterId, TaskId};
pub use task::{AnalysisOutput, DocumentRef, TaskRecord, TaskState};
