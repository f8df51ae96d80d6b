//! Provisioning workflows for filesystems, access points, and users.
//!
//! Every operation resolves the account alias through the
//! [`AccountRegistry`] and checks tenant visibility before touching a
//! resource. Mutating operations validate synchronously, create a task
//! record, and continue on a detached workflow that reports through the
//! task's [`ProgressSink`](crate::task::ProgressSink). The caller receives an
//! [`Accepted`] value carrying the task handle immediately; the workflow
//! outcome is only observable by polling the task.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::accounts::{Account, AccountRegistry};
use crate::config::OrchestratorConfig;
use crate::error::ProvisionError;
use crate::resolver::{ResourceResolver, TenantScope};
use crate::retry::RetryPolicy;
use crate::tags::TagKeys;
use crate::task::{ProgressSink, TaskHandle, TaskId, TaskSnapshot, TaskStore, spawn_tracked};

mod access_points;
mod account;
mod filesystem;
mod requests;
mod steps;
mod users;

pub use account::{AccountPreparation, PolicyAction};
pub use requests::{
    Accepted, AccessPointCreateRequest, FileSystemCreateRequest, FileSystemResponse,
    FileSystemUpdateRequest, UserCreateRequest, UserResponse, UserUpdateRequest,
};
pub use steps::AccountCompensator;
pub use users::UserSweep;

/// Retry budgets and rollback deadline used by workflows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WorkflowTiming {
    /// Policy for awaiting provider state changes.
    pub await_policy: RetryPolicy,
    /// Policy for the final filesystem delete.
    pub delete_policy: RetryPolicy,
    /// Deadline for unwinding a rollback stack.
    pub rollback_timeout: Duration,
}

impl Default for WorkflowTiming {
    fn default() -> Self {
        let backoff = Duration::from_secs(2);
        Self {
            await_policy: RetryPolicy::new(10, backoff),
            delete_policy: RetryPolicy::new(3, backoff),
            rollback_timeout: Duration::from_secs(120),
        }
    }
}

/// Organization-wide settings shared by every workflow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrchestratorSettings {
    /// Organization identifier written into every org tag.
    pub org: String,
    /// Keys of the org and space tags.
    pub tag_keys: TagKeys,
    /// First path component of every filesystem user.
    pub user_path_prefix: String,
    /// Base name of the per-org admin group.
    pub admin_group: String,
    /// Base name of the per-org admin policy.
    pub admin_policy: String,
    /// Retry and rollback timing.
    pub timing: WorkflowTiming,
}

impl OrchestratorSettings {
    /// Settings for `org` with default names and timing.
    #[must_use]
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            tag_keys: TagKeys::default(),
            user_path_prefix: String::from("fsorch"),
            admin_group: String::from("SpinupEFSAdminGroup"),
            admin_policy: String::from("SpinupEFSAdminPolicy"),
            timing: WorkflowTiming::default(),
        }
    }

    /// Settings taken from loaded configuration.
    #[must_use]
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            org: config.org.clone(),
            tag_keys: config.tag_keys(),
            user_path_prefix: config.user_path_prefix.clone(),
            admin_group: config.admin_group.clone(),
            admin_policy: config.admin_policy.clone(),
            timing: config.timing(),
        }
    }

    /// Replaces the workflow timing.
    #[must_use]
    pub const fn with_timing(mut self, timing: WorkflowTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Name of the org's admin group, `<admin_group>-<org>`.
    #[must_use]
    pub fn admin_group_name(&self) -> String {
        format!("{}-{}", self.admin_group, self.org)
    }

    /// Name of the org's admin policy, `<admin_policy>-<org>`.
    #[must_use]
    pub fn admin_policy_name(&self) -> String {
        format!("{}-{}", self.admin_policy, self.org)
    }

    /// Path holding the org's admin policy and group.
    #[must_use]
    pub fn org_path(&self) -> String {
        format!("/{}/{}/", self.user_path_prefix, self.org)
    }

    /// Path holding the users of one filesystem.
    #[must_use]
    pub fn user_path(&self, space: &str, file_system_name: &str) -> String {
        format!(
            "/{}/{}/{space}/{file_system_name}/",
            self.user_path_prefix, self.org
        )
    }
}

/// Entry point for every provisioning operation.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<AccountRegistry>,
    tasks: Arc<dyn TaskStore>,
    settings: Arc<OrchestratorSettings>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Orchestrator")
            .field("accounts", &self.registry.aliases())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over a registry and a task store.
    #[must_use]
    pub fn new(
        registry: AccountRegistry,
        tasks: Arc<dyn TaskStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            tasks,
            settings: Arc::new(settings),
        }
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Returns the current record of a task.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`ProvisionError`] for unknown tasks.
    pub async fn task(&self, id: TaskId) -> Result<TaskSnapshot, ProvisionError> {
        Ok(self.tasks.get(id).await?)
    }

    fn account(&self, alias: &str) -> Result<&Account, ProvisionError> {
        self.registry.get(alias)
    }

    fn scope(&self, space: &str) -> TenantScope {
        TenantScope::space(self.settings.org.clone(), space)
    }

    fn resolver<'a>(&'a self, account: &'a Account) -> ResourceResolver<'a> {
        ResourceResolver::new(
            account.clients.control_plane.as_ref(),
            &self.settings.tag_keys,
        )
    }

    /// Fails with not found unless `file_system_id` is visible in `space`.
    async fn require_visible(
        &self,
        account: &Account,
        space: &str,
        file_system_id: &str,
    ) -> Result<(), ProvisionError> {
        let visible = self
            .resolver(account)
            .exists(&self.scope(space), file_system_id)
            .await?;
        if visible {
            return Ok(());
        }
        debug!(account = %account.alias, space, file_system_id, "filesystem not visible to tenant");
        Err(ProvisionError::not_found(format!(
            "filesystem {file_system_id} not found in space {space}"
        )))
    }

    /// Records a pending task and starts `workflow` under its tracker.
    async fn launch<F, Fut>(&self, task_id: TaskId, workflow: F) -> Result<TaskHandle, ProvisionError>
    where
        F: FnOnce(ProgressSink) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ProvisionError>> + Send + 'static,
    {
        self.tasks.create(task_id).await?;
        Ok(spawn_tracked(Arc::clone(&self.tasks), task_id, workflow))
    }
}

#[cfg(test)]
mod tests;
