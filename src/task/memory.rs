//! In-process task store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{TaskFuture, TaskId, TaskSnapshot, TaskStatus, TaskStore, TaskStoreError};

#[derive(Debug)]
struct Entry {
    status: TaskStatus,
    log: Vec<String>,
    failure: Option<String>,
    history: Vec<TaskStatus>,
    check_ins: u64,
}

impl Entry {
    fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            log: Vec::new(),
            failure: None,
            history: vec![TaskStatus::Pending],
            check_ins: 0,
        }
    }

    fn transition(&mut self, status: TaskStatus) {
        self.status = status;
        self.history.push(status);
    }
}

/// Task store kept in memory, suitable for a single process and for tests.
///
/// Terminal states are final: completing or failing a finished task, or
/// appending to its log, returns [`TaskStoreError::AlreadyTerminal`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<Mutex<HashMap<TaskId, Entry>>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every status the task has passed through, oldest first.
    #[must_use]
    pub fn history(&self, id: TaskId) -> Vec<TaskStatus> {
        self.lock()
            .ok()
            .and_then(|tasks| tasks.get(&id).map(|entry| entry.history.clone()))
            .unwrap_or_default()
    }

    /// Returns how many liveness checkpoints the task has recorded.
    #[must_use]
    pub fn check_ins(&self, id: TaskId) -> u64 {
        self.lock()
            .ok()
            .and_then(|tasks| tasks.get(&id).map(|entry| entry.check_ins))
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TaskId, Entry>>, TaskStoreError> {
        self.tasks.lock().map_err(|err| TaskStoreError::Unavailable {
            message: err.to_string(),
        })
    }

    fn with_live_entry(
        &self,
        id: TaskId,
        update: impl FnOnce(&mut Entry),
    ) -> Result<(), TaskStoreError> {
        let mut tasks = self.lock()?;
        let entry = tasks
            .get_mut(&id)
            .ok_or(TaskStoreError::UnknownTask { id })?;
        if entry.status.is_terminal() {
            return Err(TaskStoreError::AlreadyTerminal {
                id,
                status: entry.status,
            });
        }
        update(entry);
        Ok(())
    }
}

impl TaskStore for InMemoryTaskStore {
    fn create(&self, id: TaskId) -> TaskFuture<'_, ()> {
        let result = self.lock().and_then(|mut tasks| {
            if tasks.contains_key(&id) {
                return Err(TaskStoreError::Duplicate { id });
            }
            tasks.insert(id, Entry::pending());
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn start(&self, id: TaskId) -> TaskFuture<'_, ()> {
        let result = self.with_live_entry(id, |entry| entry.transition(TaskStatus::Running));
        Box::pin(async move { result })
    }

    fn check_in(&self, id: TaskId) -> TaskFuture<'_, ()> {
        let result = self.with_live_entry(id, |entry| entry.check_ins += 1);
        Box::pin(async move { result })
    }

    fn append_log(&self, id: TaskId, message: String) -> TaskFuture<'_, ()> {
        let result = self.with_live_entry(id, |entry| entry.log.push(message));
        Box::pin(async move { result })
    }

    fn fail(&self, id: TaskId, reason: String) -> TaskFuture<'_, ()> {
        let result = self.with_live_entry(id, |entry| {
            entry.failure = Some(reason);
            entry.transition(TaskStatus::Failed);
        });
        Box::pin(async move { result })
    }

    fn complete(&self, id: TaskId) -> TaskFuture<'_, ()> {
        let result = self.with_live_entry(id, |entry| entry.transition(TaskStatus::Completed));
        Box::pin(async move { result })
    }

    fn get(&self, id: TaskId) -> TaskFuture<'_, TaskSnapshot> {
        let result = self.lock().and_then(|tasks| {
            tasks
                .get(&id)
                .map(|entry| TaskSnapshot {
                    id,
                    status: entry.status,
                    log: entry.log.clone(),
                    failure: entry.failure.clone(),
                })
                .ok_or(TaskStoreError::UnknownTask { id })
        });
        Box::pin(async move { result })
    }
}
