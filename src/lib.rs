//! Core library for the fsorch provisioning orchestrator.
//!
//! The crate provisions tenant-scoped shared filesystems together with their
//! mount endpoints, access points, and identity principals. Every mutating
//! operation returns immediately with a task handle while a detached workflow
//! drives the provider to the requested state, records progress on the task,
//! and unwinds its compensations when a step fails.

pub mod accounts;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod rollback;
pub mod tags;
pub mod task;
pub mod test_support;

pub use accounts::{
    Account, AccountClients, AccountDefaults, AccountRegistry, AccountSettings, AccountsError,
    AccountsFile,
};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::{ErrorKind, ProviderError, ProvisionError};
pub use lifecycle::{BackupPolicy, LifecycleConfiguration, TransitionToIa, TransitionToPrimary};
pub use logging::{LogFormat, init_logging};
pub use orchestrator::{
    Accepted, AccessPointCreateRequest, AccountCompensator, AccountPreparation,
    FileSystemCreateRequest, FileSystemResponse, FileSystemUpdateRequest, Orchestrator,
    OrchestratorSettings, PolicyAction, UserCreateRequest, UserResponse, UserSweep,
    UserUpdateRequest, WorkflowTiming,
};
pub use policy::{AccessPolicyFlags, PolicyDocument, resource_policy};
pub use resolver::{ResourceResolver, TenantScope};
pub use retry::{RetryError, RetryPolicy, retry};
pub use rollback::{Compensation, Compensator, RollbackReport, RollbackStack};
pub use tags::{Tag, TagKeys};
pub use task::{
    InMemoryTaskStore, ProgressSink, TaskHandle, TaskId, TaskSnapshot, TaskStatus, TaskStore,
    TaskStoreError, spawn_tracked,
};
