//! Externally visible task records for asynchronous workflows.
//!
//! A task is created in the `pending` state when a mutating request is
//! accepted, moves to `running` once its tracker starts, and reaches exactly
//! one terminal state. The [`TaskStore`] trait is the durable record pollers
//! read; [`spawn_tracked`] bridges a running workflow onto it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use uuid::Uuid;

use crate::error::ProvisionError;

mod memory;
mod tracker;

pub use memory::InMemoryTaskStore;
pub use tracker::{ProgressSink, TaskHandle, spawn_tracked};

/// Opaque task identifier, also used as the provider idempotency token.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the identifier rendered as an idempotency token.
    #[must_use]
    pub fn token(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, formatter)
    }
}

/// Status of a task record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TaskStatus {
    /// Accepted but the tracker has not started yet.
    Pending,
    /// Workflow is executing.
    Running,
    /// Workflow finished successfully.
    Completed,
    /// Workflow reported an unrecoverable error.
    Failed,
}

impl TaskStatus {
    /// Returns `true` for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the lowercase label used in task listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Point-in-time view of a task record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskSnapshot {
    /// Task identifier.
    pub id: TaskId,
    /// Current status.
    pub status: TaskStatus,
    /// Progress messages in the order they were appended.
    pub log: Vec<String>,
    /// Failure reason when the status is [`TaskStatus::Failed`].
    pub failure: Option<String>,
}

/// Errors raised by task stores.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TaskStoreError {
    /// Raised when no record exists for the identifier.
    #[error("task {id} not found")]
    UnknownTask {
        /// Identifier that was looked up.
        id: TaskId,
    },
    /// Raised when a record already exists for the identifier.
    #[error("task {id} already exists")]
    Duplicate {
        /// Identifier that was reused.
        id: TaskId,
    },
    /// Raised when a terminal task is mutated again.
    #[error("task {id} is already {status}")]
    AlreadyTerminal {
        /// Identifier of the finished task.
        id: TaskId,
        /// Terminal status recorded earlier.
        status: TaskStatus,
    },
    /// Raised when the backing store cannot be reached.
    #[error("task store unavailable: {message}")]
    Unavailable {
        /// Store-specific description.
        message: String,
    },
}

impl From<TaskStoreError> for ProvisionError {
    fn from(value: TaskStoreError) -> Self {
        match value {
            TaskStoreError::UnknownTask { .. } => Self::not_found(value.to_string()),
            _ => Self::internal(value.to_string()),
        }
    }
}

/// Future returned by task store operations.
pub type TaskFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TaskStoreError>> + Send + 'a>>;

/// Durable record of task progress, shared with pollers.
pub trait TaskStore: Send + Sync {
    /// Records a new task in the `pending` state.
    fn create(&self, id: TaskId) -> TaskFuture<'_, ()>;

    /// Marks the task as running.
    fn start(&self, id: TaskId) -> TaskFuture<'_, ()>;

    /// Refreshes the liveness checkpoint of a running task.
    fn check_in(&self, id: TaskId) -> TaskFuture<'_, ()>;

    /// Appends a progress message to the task log.
    fn append_log(&self, id: TaskId, message: String) -> TaskFuture<'_, ()>;

    /// Marks the task failed with the given reason.
    fn fail(&self, id: TaskId, reason: String) -> TaskFuture<'_, ()>;

    /// Marks the task completed.
    fn complete(&self, id: TaskId) -> TaskFuture<'_, ()>;

    /// Returns the current record.
    fn get(&self, id: TaskId) -> TaskFuture<'_, TaskSnapshot>;
}
