//! Bridge between a running workflow and its task record.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{TaskId, TaskStore};
use crate::error::ProvisionError;

/// Number of progress messages buffered between a workflow and its tracker.
const PROGRESS_CAPACITY: usize = 32;

#[derive(Debug)]
enum TaskEvent {
    Progress(String),
    Finished(Result<(), ProvisionError>),
}

/// Progress reporting capability handed to a workflow.
///
/// Messages are delivered to the task log in the order they were sent.
/// Sending after the tracker has stopped is a no-op.
#[derive(Clone, Debug)]
pub struct ProgressSink {
    task_id: TaskId,
    sender: mpsc::Sender<TaskEvent>,
}

impl ProgressSink {
    /// Identifier of the task this sink reports to.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Appends a progress message to the task log.
    pub async fn send(&self, message: impl Into<String>) {
        let text = message.into();
        info!(task_id = %self.task_id, "{text}");
        if self.sender.send(TaskEvent::Progress(text)).await.is_err() {
            debug!(task_id = %self.task_id, "tracker stopped; dropping progress message");
        }
    }
}

/// Handle to a spawned workflow and its tracker.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    tracker: JoinHandle<()>,
}

impl TaskHandle {
    /// Identifier of the tracked task.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Waits until the tracker has recorded the terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the tracker task panicked or was
    /// aborted.
    pub async fn wait(self) -> Result<(), ProvisionError> {
        self.tracker
            .await
            .map_err(|err| ProvisionError::internal(format!("task tracker {}: {err}", self.id)))
    }
}

/// Runs `workflow` on a detached task and mirrors its progress onto `store`.
///
/// The task must already exist in the store. The tracker marks it running,
/// records each progress message with a liveness checkpoint, and finally
/// marks it completed or failed according to the workflow's result. The
/// outcome travels through the same channel as the progress messages, so the
/// last message is always recorded before the terminal state. A workflow that
/// ends without producing an outcome marks the task failed.
pub fn spawn_tracked<F, Fut>(store: Arc<dyn TaskStore>, task_id: TaskId, workflow: F) -> TaskHandle
where
    F: FnOnce(ProgressSink) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ProvisionError>> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(PROGRESS_CAPACITY);
    let tracker = tokio::spawn(track(store, task_id, receiver));

    let sink = ProgressSink {
        task_id,
        sender: sender.clone(),
    };
    tokio::spawn(async move {
        let outcome = workflow(sink).await;
        if sender.send(TaskEvent::Finished(outcome)).await.is_err() {
            warn!(task_id = %task_id, "tracker stopped before the workflow finished");
        }
    });

    TaskHandle {
        id: task_id,
        tracker,
    }
}

async fn track(
    store: Arc<dyn TaskStore>,
    task_id: TaskId,
    mut receiver: mpsc::Receiver<TaskEvent>,
) {
    if let Err(err) = store.start(task_id).await {
        error!(task_id = %task_id, error = %err, "failed to mark task running");
    }

    while let Some(event) = receiver.recv().await {
        match event {
            TaskEvent::Progress(message) => record_progress(store.as_ref(), task_id, message).await,
            TaskEvent::Finished(Ok(())) => {
                info!(task_id = %task_id, "task completed");
                if let Err(err) = store.complete(task_id).await {
                    error!(task_id = %task_id, error = %err, "failed to mark task completed");
                }
                return;
            }
            TaskEvent::Finished(Err(failure)) => {
                record_failure(store.as_ref(), task_id, failure.to_string()).await;
                return;
            }
        }
    }

    record_failure(
        store.as_ref(),
        task_id,
        String::from("workflow ended without reporting an outcome"),
    )
    .await;
}

async fn record_progress(store: &dyn TaskStore, task_id: TaskId, message: String) {
    if let Err(err) = store.check_in(task_id).await {
        warn!(task_id = %task_id, error = %err, "failed to check in task");
    }
    if let Err(err) = store.append_log(task_id, message).await {
        warn!(task_id = %task_id, error = %err, "failed to append task log");
    }
}

async fn record_failure(store: &dyn TaskStore, task_id: TaskId, reason: String) {
    error!(task_id = %task_id, reason = %reason, "task failed");
    if let Err(err) = store.fail(task_id, reason).await {
        error!(task_id = %task_id, error = %err, "failed to mark task failed");
    }
}
