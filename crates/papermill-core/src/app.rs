//! Application wiring.
//!
//! `AppBuilder` validates the configuration up front (fail-fast: a bad knob
//! is a build error, not a runtime surprise) and assembles store, queue,
//! worker pool, timeout supervisor, and retention sweeper into one `App`
//! handle with a clean shutdown path.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, QueueConfig};
use crate::domain::{DocumentRef, QueryError, SubmitError, SubmitterId, TaskId};
use crate::processor::DocumentProcessor;
use crate::queue::JobQueue;
use crate::status::{QueueSnapshot, StatusService, TaskView};
use crate::store::{InMemoryTaskStore, TaskStore};
use crate::supervisor::TimeoutSupervisor;
use crate::sweeper::RetentionSweeper;
use crate::worker::WorkerPool;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no document processor registered")]
    MissingProcessor,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Builds an [`App`].
///
/// ```ignore
/// let app = AppBuilder::new()
///     .config(QueueConfig::default())
///     .processor(Arc::new(MyEngine::new()))
///     .build()?;
/// ```
pub struct AppBuilder {
    config: QueueConfig,
    processor: Option<Arc<dyn DocumentProcessor>>,
    store: Option<Arc<dyn TaskStore>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            processor: None,
            store: None,
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// The analysis engine every worker will invoke.
    pub fn processor(mut self, processor: Arc<dyn DocumentProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Override the record store (defaults to the in-memory one).
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate and start everything: workers, supervisor, sweeper.
    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let processor = self.processor.ok_or(BuildError::MissingProcessor)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));

        let queue = Arc::new(JobQueue::new(
            Arc::clone(&store),
            self.config.max_queue_size,
        ));
        let status = StatusService::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            self.config.max_concurrent,
        );
        let workers = WorkerPool::spawn(self.config.max_concurrent, Arc::clone(&queue), processor);

        let (background_tx, background_rx) = watch::channel(false);
        let background = vec![
            TimeoutSupervisor::spawn(
                Arc::clone(&store),
                Arc::clone(&queue),
                self.config.task_timeout,
                self.config.supervisor_tick,
                background_rx.clone(),
            ),
            RetentionSweeper::spawn(
                Arc::clone(&store),
                self.config.retention,
                self.config.sweep_interval,
                background_rx,
            ),
        ];

        Ok(App {
            queue,
            status,
            workers,
            background_tx,
            background,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Running queue instance: submission surface, status surface, and the
/// background machinery behind them.
pub struct App {
    queue: Arc<JobQueue>,
    status: StatusService,
    workers: WorkerPool,
    background_tx: watch::Sender<bool>,
    background: Vec<JoinHandle<()>>,
}

impl App {
    /// Admit a document-analysis task (upload layer entry point).
    pub async fn submit(
        &self,
        submitter: SubmitterId,
        document: DocumentRef,
    ) -> Result<TaskId, SubmitError> {
        self.queue.submit(submitter, document).await
    }

    /// Poll one task (client endpoint: `GET /task/{id}`).
    pub async fn task_view(
        &self,
        id: TaskId,
        requester: &SubmitterId,
    ) -> Result<TaskView, QueryError> {
        self.status.task_view(id, requester).await
    }

    /// Poll the queue (client endpoint: `GET /queue/status`).
    pub async fn snapshot(&self, requester: &SubmitterId) -> QueueSnapshot {
        self.status.snapshot(requester).await
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }

    /// Stop taking new work and wait for workers and background loops.
    /// In-flight processing finishes (or is abandoned to its own devices if
    /// it ignores cancellation — same contract as the supervisor's).
    pub async fn shutdown_and_join(self) {
        self.workers.shutdown_and_join().await;
        let _ = self.background_tx.send(true);
        for join in self.background {
            let _ = join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{AnalysisOutput, TaskState};
    use crate::processor::{ProcessError, TaskContext};

    struct EchoProcessor;

    #[async_trait]
    impl DocumentProcessor for EchoProcessor {
        async fn process(
            &self,
            document: DocumentRef,
            _ctx: TaskContext,
        ) -> Result<AnalysisOutput, ProcessError> {
            Ok(AnalysisOutput::new(
                serde_json::json!({"doc": document.as_str()}),
            ))
        }
    }

    #[tokio::test]
    async fn build_requires_a_processor() {
        let err = AppBuilder::new().build();
        assert!(matches!(err, Err(BuildError::MissingProcessor)));
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let err = AppBuilder::new()
            .processor(Arc::new(EchoProcessor))
            .config(QueueConfig {
                max_concurrent: 0,
                ..QueueConfig::default()
            })
            .build();
        assert!(matches!(
            err,
            Err(BuildError::Config(ConfigError::NoWorkers))
        ));
    }

    #[tokio::test]
    async fn submit_poll_complete_roundtrip() {
        let app = AppBuilder::new()
            .processor(Arc::new(EchoProcessor))
            .build()
            .unwrap();

        let alice = SubmitterId::new("alice");
        let id = app
            .submit(alice.clone(), DocumentRef::new("report.pdf"))
            .await
            .unwrap();

        let view = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let view = app.task_view(id, &alice).await.unwrap();
                if view.state.is_terminal() {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task never finished");

        assert_eq!(view.state, TaskState::Completed);
        assert_eq!(
            view.output.unwrap().as_value()["doc"],
            serde_json::json!("report.pdf")
        );

        let snapshot = app.snapshot(&alice).await;
        assert_eq!(snapshot.counts.completed, 1);
        assert!(snapshot.your_tasks.is_empty());

        app.shutdown_and_join().await;
    }
}
