//! Ordered analysis queue
//!
//! Document and workspace notifications become [`Task`]s. One loop applies them in
//! arrival order on the blocking pool, then publishes diagnostics for every affected
//! open document.

use std::sync::Arc;

use tokio::sync::mpsc;
use tower_lsp::Client;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::lsp::convert;
use crate::workspace::{IndexError, Update, WorkspaceIndex};

#[derive(Debug)]
pub enum Task {
    Open {
        uri: Url,
        text: String,
        version: i32,
    },
    Change {
        uri: Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    },
    Close {
        uri: Url,
    },
    /// Created or changed on disk.
    Reload {
        uri: Url,
    },
    /// Deleted on disk.
    Remove {
        uri: Url,
    },
    Configure(Settings),
}

impl Task {
    fn apply(self, index: &WorkspaceIndex) -> Result<Update, IndexError> {
        match self {
            Task::Open { uri, text, version } => index.open(uri, text, version),
            Task::Change {
                uri,
                version,
                changes,
            } => index.edit(uri, version, changes),
            Task::Close { uri } => index.close(uri),
            Task::Reload { uri } => index.reload(&uri),
            Task::Remove { uri } => index.remove(&uri),
            Task::Configure(settings) => index.configure(settings),
        }
    }
}

/// Handle to the analysis loop. Dropping every handle stops the loop.
#[derive(Clone)]
pub struct AnalysisWorker {
    sender: mpsc::UnboundedSender<Task>,
}

impl AnalysisWorker {
    /// Start the loop on the current tokio runtime.
    pub fn spawn(client: Client, index: Arc<WorkspaceIndex>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(receiver, client, index));
        Self { sender }
    }

    pub fn submit(&self, task: Task) {
        if let Err(err) = self.sender.send(task) {
            error!(task = ?err.0, "analysis worker is gone, dropping task");
        }
    }
}

async fn run(
    mut receiver: mpsc::UnboundedReceiver<Task>,
    client: Client,
    index: Arc<WorkspaceIndex>,
) {
    info!("analysis worker started");
    while let Some(task) = receiver.recv().await {
        let closed = match &task {
            Task::Close { uri } => Some(uri.clone()),
            _ => None,
        };

        let worker_index = index.clone();
        let result = tokio::task::spawn_blocking(move || task.apply(&worker_index)).await;
        match result {
            Ok(Ok(update)) => {
                if let Some(uri) = closed {
                    client.publish_diagnostics(uri, Vec::new(), None).await;
                }
                publish(&client, &index, &update).await;
            }
            Ok(Err(err @ IndexError::StaleVersion { .. })) => {
                warn!(error = %err, "dropping stale edit");
            }
            Ok(Err(err)) => {
                warn!(error = %err, "rejected document notification");
            }
            Err(err) => {
                error!(error = %err, "analysis task failed");
            }
        }
    }
    info!("analysis worker stopped");
}

/// Send the committed diagnostics of every affected open document.
async fn publish(client: &Client, index: &WorkspaceIndex, update: &Update) {
    let snapshot = index.snapshot();
    for uri in &update.affected {
        let Some(file) = snapshot.file(uri).filter(|file| file.open) else {
            continue;
        };
        let diagnostics = convert::diagnostics(&snapshot, file);
        debug!(%uri, count = diagnostics.len(), version = ?file.version, "publishing diagnostics");
        client
            .publish_diagnostics(uri.clone(), diagnostics, file.version)
            .await;
    }
}
