//! Demo driver for papermill-core.
//!
//! Wires a mock analysis engine into the queue, submits a handful of
//! documents (one slow enough to hit the deadline, one broken), and polls
//! status the way a real client would until everything is terminal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;

use papermill_core::{
    AnalysisOutput, AppBuilder, DocumentProcessor, DocumentRef, ProcessError, QueueConfig,
    SubmitterId, TaskContext,
};

/// Mock engine: the "document" is a JSON description of how to behave.
#[derive(Debug, Deserialize)]
struct MockDocument {
    name: String,
    pages: u32,
    #[serde(default)]
    broken: bool,
}

struct MockEngine;

#[async_trait]
impl DocumentProcessor for MockEngine {
    async fn process(
        &self,
        document: DocumentRef,
        ctx: TaskContext,
    ) -> Result<AnalysisOutput, ProcessError> {
        let doc: MockDocument = serde_json::from_str(document.as_str())
            .map_err(|e| ProcessError::new(format!("unreadable document: {e}")))?;

        if doc.broken {
            return Err(ProcessError::new(format!(
                "{}: no extractable tables",
                doc.name
            )));
        }

        for page in 1..=doc.pages {
            if ctx.is_cancelled() {
                return Err(ProcessError::new(format!(
                    "{}: cancelled on page {page}",
                    doc.name
                )));
            }
            ctx.report_progress(format!("{}: page {page}/{}", doc.name, doc.pages))
                .await;
            sleep(Duration::from_millis(120)).await;
        }

        Ok(AnalysisOutput::new(serde_json::json!({
            "name": doc.name,
            "pages": doc.pages,
            "tables": doc.pages * 2,
        })))
    }
}

fn doc(name: &str, pages: u32, broken: bool) -> DocumentRef {
    DocumentRef::new(
        serde_json::json!({"name": name, "pages": pages, "broken": broken}).to_string(),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let app = AppBuilder::new()
        .config(QueueConfig {
            max_concurrent: 2,
            max_queue_size: 8,
            task_timeout: Duration::from_millis(600),
            supervisor_tick: Duration::from_millis(100),
            ..QueueConfig::default()
        })
        .processor(Arc::new(MockEngine))
        .build()?;

    let alice = SubmitterId::new("alice");
    let bob = SubmitterId::new("bob");

    let mut ids = vec![
        (alice.clone(), app.submit(alice.clone(), doc("quarterly.pdf", 3, false)).await?),
        (alice.clone(), app.submit(alice.clone(), doc("invoices.pdf", 2, false)).await?),
        (bob.clone(), app.submit(bob.clone(), doc("scanned-fax.pdf", 1, true)).await?),
        (bob.clone(), app.submit(bob.clone(), doc("phonebook.pdf", 50, false)).await?),
    ];
    println!("submitted {} documents", ids.len());

    let snapshot = app.snapshot(&alice).await;
    println!(
        "queue: length={} running={} (alice's pending: {:?})",
        snapshot.queue_length,
        snapshot.running,
        snapshot
            .your_tasks
            .iter()
            .map(|t| t.position)
            .collect::<Vec<_>>()
    );

    // Poll until everything is terminal, like a browser tab would.
    while !ids.is_empty() {
        sleep(Duration::from_millis(200)).await;
        let mut remaining = Vec::new();
        for (owner, id) in ids {
            let view = app.task_view(id, &owner).await?;
            if view.state.is_terminal() {
                match view.failure {
                    Some(failure) => println!("{id}: {:?} ({failure})", view.state),
                    None => println!(
                        "{id}: {:?} -> {}",
                        view.state,
                        view.output.map(|o| o.into_value()).unwrap_or_default()
                    ),
                }
            } else {
                if let Some(progress) = view.progress {
                    println!("{id}: {:?} ({progress})", view.state);
                }
                remaining.push((owner, id));
            }
        }
        ids = remaining;
    }

    let snapshot = app.snapshot(&alice).await;
    println!(
        "final counts: completed={} failed={} timed_out={}",
        snapshot.counts.completed, snapshot.counts.failed, snapshot.counts.timed_out
    );

    app.shutdown_and_join().await;
    Ok(())
}
