//! Shared fixtures for provisioning BDD scenarios.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use fsorch::test_support::FakeCloud;
use fsorch::{
    AccountRegistry, FileSystemCreateRequest, InMemoryTaskStore, Orchestrator,
    OrchestratorSettings, ProvisionError, RetryPolicy, TaskSnapshot, WorkflowTiming,
};
use rstest::fixture;

pub const ACCOUNT: &str = "sandbox";

/// Result of the last `When` step.
#[derive(Clone, Debug)]
pub enum Outcome {
    Finished(TaskSnapshot),
    Rejected(ProvisionError),
}

/// Scenario state. Every mutable field is shared so clones handed to steps
/// observe the same scenario.
#[derive(Clone, Debug)]
pub struct ProvisioningContext {
    pub cloud: FakeCloud,
    pub tasks: InMemoryTaskStore,
    pub orchestrator: Orchestrator,
    request: Arc<Mutex<FileSystemCreateRequest>>,
    space: Arc<Mutex<Option<String>>>,
    file_system_id: Arc<Mutex<Option<String>>>,
    outcome: Arc<Mutex<Option<Outcome>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|err| panic!("provisioning context lock poisoned: {err}"))
}

impl ProvisioningContext {
    pub fn request(&self) -> FileSystemCreateRequest {
        lock(&self.request).clone()
    }

    pub fn update_request(&self, update: impl FnOnce(&mut FileSystemCreateRequest)) {
        update(&mut lock(&self.request));
    }

    pub fn space(&self) -> Option<String> {
        lock(&self.space).clone()
    }

    pub fn file_system_id(&self) -> Option<String> {
        lock(&self.file_system_id).clone()
    }

    pub fn record_file_system(&self, space: &str, id: String) {
        *lock(&self.space) = Some(space.to_owned());
        *lock(&self.file_system_id) = Some(id);
    }

    pub fn outcome(&self) -> Option<Outcome> {
        lock(&self.outcome).clone()
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        *lock(&self.outcome) = Some(outcome);
    }
}

fn fast_timing() -> WorkflowTiming {
    let backoff = Duration::from_millis(1);
    WorkflowTiming {
        await_policy: RetryPolicy::new(10, backoff),
        delete_policy: RetryPolicy::new(3, backoff),
        rollback_timeout: Duration::from_secs(5),
    }
}

#[fixture]
pub fn provisioning_context() -> ProvisioningContext {
    let cloud = FakeCloud::new();
    let mut registry = AccountRegistry::new();
    registry.insert(cloud.account(ACCOUNT));
    let tasks = InMemoryTaskStore::new();
    let settings = OrchestratorSettings::new("acme").with_timing(fast_timing());
    let orchestrator = Orchestrator::new(registry, Arc::new(tasks.clone()), settings);

    ProvisioningContext {
        cloud,
        tasks,
        orchestrator,
        request: Arc::default(),
        space: Arc::default(),
        file_system_id: Arc::default(),
        outcome: Arc::default(),
    }
}
