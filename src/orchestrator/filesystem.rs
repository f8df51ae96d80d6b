//! Filesystem create, describe, list, update, and delete.

use std::sync::Arc;

use tracing::{info, warn};

use super::requests::{
    Accepted, AccessPointCreateRequest, FileSystemCreateRequest, FileSystemResponse,
    FileSystemUpdateRequest,
};
use super::steps::{
    AccountCompensator, await_file_system, await_mount_endpoints, await_no_mount_endpoints,
    delete_access_points, delete_file_system, delete_mount_endpoint,
};
use super::users::FileSystemUsers;
use super::{Orchestrator, OrchestratorSettings};
use crate::accounts::Account;
use crate::error::{ProviderResultExt, ProvisionError};
use crate::lifecycle::{
    BackupPolicy, LifecycleConfiguration, TransitionToIa, TransitionToPrimary, parse_or,
};
use crate::policy::{AccessPolicyFlags, flags_from_policy, resource_policy};
use crate::provider::{
    FileSystem, FileSystemSpec, LifecycleState, MountEndpointSpec,
    PERFORMANCE_MODE_GENERAL_PURPOSE,
};
use crate::resolver::TenantScope;
use crate::rollback::{Compensation, RollbackStack};
use crate::tags::{Tag, normalize_tags};
use crate::task::{ProgressSink, TaskHandle, TaskId, TaskStatus, TaskStore};

/// Create request after validation and account defaults.
#[derive(Clone, Debug)]
struct ProvisionPlan {
    name: String,
    backup_policy: BackupPolicy,
    lifecycle: LifecycleConfiguration,
    kms_key_id: String,
    subnets: Vec<String>,
    security_groups: Vec<String>,
    access_points: Vec<AccessPointCreateRequest>,
    access_policy: Option<AccessPolicyFlags>,
}

impl ProvisionPlan {
    fn validate(account: &Account, request: FileSystemCreateRequest) -> Result<Self, ProvisionError> {
        if request.name.trim().is_empty() {
            return Err(ProvisionError::bad_request("filesystem name is required"));
        }

        let backup_policy = parse_or(&request.backup_policy, BackupPolicy::Disabled)?;
        let lifecycle = LifecycleConfiguration {
            transition_to_ia: parse_or(&request.lifecycle_configuration, TransitionToIa::None)?,
            transition_to_primary: parse_or(
                &request.transition_to_primary_storage_class,
                TransitionToPrimary::None,
            )?,
        };

        let defaults = &account.defaults;
        let kms_key_id = if request.kms_key_id.trim().is_empty() {
            defaults.default_kms_key_id.clone()
        } else {
            request.kms_key_id
        };
        let subnets = if request.subnets.is_empty() {
            defaults.default_subnets.clone()
        } else {
            request.subnets
        };
        let security_groups = if request.security_groups.is_empty() {
            defaults.default_security_groups.clone()
        } else {
            request.security_groups
        };

        Ok(Self {
            name: request.name,
            backup_policy,
            lifecycle,
            kms_key_id,
            subnets,
            security_groups,
            access_points: request.access_points,
            access_policy: request.access_policy,
        })
    }
}

/// Policy document change requested by an update.
#[derive(Clone, Debug, Eq, PartialEq)]
enum PolicyChange {
    Keep,
    Replace(String),
    Clear,
}

impl Orchestrator {
    /// Validates and starts provisioning a filesystem.
    ///
    /// Validation, one-zone placement, and the create call happen before
    /// this returns; the filesystem in the result is in whatever state the
    /// create call reported. The tracked workflow then waits for the
    /// filesystem, applies its policies, creates mount endpoints and access
    /// points, and rolls everything back on failure.
    ///
    /// # Errors
    ///
    /// Returns a bad request for invalid input, not found for unknown
    /// accounts, or the classified provider error of a failed create call.
    pub async fn create_filesystem(
        &self,
        account: &str,
        space: &str,
        request: FileSystemCreateRequest,
    ) -> Result<Accepted<FileSystem>, ProvisionError> {
        let account = self.account(account)?.clone();
        let one_zone = request.one_zone;
        let client_tags = request.tags.clone();
        let mut plan = ProvisionPlan::validate(&account, request)?;
        let availability_zone = if one_zone {
            let (subnet, zone) = place_in_one_zone(&account, &plan.subnets).await?;
            plan.subnets = vec![subnet];
            Some(zone)
        } else {
            None
        };

        let spec = FileSystemSpec {
            kms_key_id: plan.kms_key_id.clone(),
            encrypted: true,
            performance_mode: PERFORMANCE_MODE_GENERAL_PURPOSE.to_owned(),
            availability_zone,
            tags: normalize_tags(
                &self.settings.tag_keys,
                &self.settings.org,
                &plan.name,
                space,
                &client_tags,
            ),
        };

        let task_id = TaskId::new();
        let file_system = account
            .clients
            .control_plane
            .create_file_system(&spec, &task_id.token())
            .await
            .context(&format!("create filesystem {}", plan.name))?;
        info!(
            task_id = %task_id,
            account = %account.alias,
            space,
            file_system_id = %file_system.id,
            "filesystem create accepted"
        );

        let workflow = CreateWorkflow {
            orchestrator: self.clone(),
            account,
            space: space.to_owned(),
            file_system_id: file_system.id.clone(),
            arn: file_system.arn.clone(),
            plan,
        };
        let task = self.launch(task_id, move |sink| workflow.run(sink)).await?;
        Ok(Accepted {
            body: file_system,
            task,
        })
    }

    /// Describes a filesystem together with its endpoints, access points,
    /// and policies.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space`, or the
    /// classified provider error of a failed lookup.
    pub async fn get_filesystem(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
    ) -> Result<FileSystemResponse, ProvisionError> {
        let account = self.account(account)?;
        self.require_visible(account, space, file_system_id).await?;
        let control_plane = account.clients.control_plane.as_ref();

        let file_system = control_plane
            .get_file_system(file_system_id)
            .await
            .context(&format!("describe filesystem {file_system_id}"))?;
        let mount_targets = control_plane
            .list_mount_endpoints(file_system_id)
            .await
            .context(&format!("list mount endpoints of {file_system_id}"))?;
        let access_points = control_plane
            .list_access_points(file_system_id)
            .await
            .context(&format!("list access points of {file_system_id}"))?;
        let backup_policy = control_plane
            .get_backup_policy(file_system_id)
            .await
            .context(&format!("get backup policy of {file_system_id}"))?;
        let lifecycle = control_plane
            .get_lifecycle(file_system_id)
            .await
            .context(&format!("get lifecycle configuration of {file_system_id}"))?;
        let document = control_plane
            .get_access_policy(file_system_id)
            .await
            .context(&format!("get access policy of {file_system_id}"))?;

        Ok(FileSystemResponse {
            file_system,
            mount_targets,
            access_points,
            backup_policy,
            lifecycle_configuration: lifecycle.transition_to_ia,
            transition_to_primary_storage_class: lifecycle.transition_to_primary,
            access_policy: flags_from_policy(document.as_deref().unwrap_or_default())?,
        })
    }

    /// Lists filesystem identifiers of the org, optionally within one space.
    ///
    /// # Errors
    ///
    /// Returns not found for unknown accounts or the classified provider
    /// error of a failed listing.
    pub async fn list_filesystems(
        &self,
        account: &str,
        space: Option<&str>,
    ) -> Result<Vec<String>, ProvisionError> {
        let account = self.account(account)?;
        let scope = TenantScope {
            org: self.settings.org.clone(),
            space: space.map(str::to_owned),
        };
        self.resolver(account).list(&scope).await
    }

    /// Validates and starts an update of an existing filesystem.
    ///
    /// Each requested change is applied independently by the tracked
    /// workflow; nothing is rolled back. When tags change, every user of the
    /// filesystem has its tags refreshed to match.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space`, or a
    /// bad request for invalid settings.
    pub async fn update_filesystem(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
        request: FileSystemUpdateRequest,
    ) -> Result<Accepted<FileSystem>, ProvisionError> {
        let account = self.account(account)?.clone();
        self.require_visible(&account, space, file_system_id).await?;
        let control_plane = account.clients.control_plane.as_ref();
        let file_system = control_plane
            .get_file_system(file_system_id)
            .await
            .context(&format!("describe filesystem {file_system_id}"))?;

        let lifecycle = if request.lifecycle_configuration.trim().is_empty()
            && request.transition_to_primary_storage_class.trim().is_empty()
        {
            None
        } else {
            let current = control_plane
                .get_lifecycle(file_system_id)
                .await
                .context(&format!("get lifecycle configuration of {file_system_id}"))?;
            Some(LifecycleConfiguration {
                transition_to_ia: parse_or(
                    &request.lifecycle_configuration,
                    current.transition_to_ia,
                )?,
                transition_to_primary: parse_or(
                    &request.transition_to_primary_storage_class,
                    current.transition_to_primary,
                )?,
            })
        };
        let backup_policy = if request.backup_policy.trim().is_empty() {
            None
        } else {
            Some(request.backup_policy.parse::<BackupPolicy>()?)
        };
        let policy = match request.access_policy.as_ref() {
            None => PolicyChange::Keep,
            Some(flags) => {
                match resource_policy(&account.number, space, &file_system.arn, Some(flags)) {
                    Some(document) => PolicyChange::Replace(document.to_json()?),
                    None => PolicyChange::Clear,
                }
            }
        };
        let tags = request.tags.as_ref().map(|tags| {
            normalize_tags(
                &self.settings.tag_keys,
                &self.settings.org,
                &file_system.name,
                space,
                tags,
            )
        });

        let workflow = UpdateWorkflow {
            settings: Arc::clone(&self.settings),
            account,
            space: space.to_owned(),
            file_system: file_system.clone(),
            backup_policy,
            lifecycle,
            policy,
            tags,
        };
        let task = self.launch(TaskId::new(), move |sink| workflow.run(sink)).await?;
        Ok(Accepted {
            body: file_system,
            task,
        })
    }

    /// Checks the delete preconditions and starts tearing a filesystem down.
    ///
    /// The filesystem and every mount endpoint must be available; otherwise
    /// nothing is deleted and no task is created. The tracked workflow
    /// deletes the filesystem's users (continuing past individual failures),
    /// its mount endpoints, its access points, and finally the filesystem.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space`, or a
    /// conflict when the filesystem or one of its endpoints is not available.
    pub async fn delete_filesystem(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
    ) -> Result<Accepted<()>, ProvisionError> {
        let account = self.account(account)?.clone();
        self.require_visible(&account, space, file_system_id).await?;
        let control_plane = account.clients.control_plane.as_ref();

        let file_system = control_plane
            .get_file_system(file_system_id)
            .await
            .context(&format!("describe filesystem {file_system_id}"))?;
        if file_system.lifecycle_state != LifecycleState::Available {
            return Err(ProvisionError::conflict(format!(
                "filesystem {file_system_id} is {}, not available",
                file_system.lifecycle_state
            )));
        }
        let endpoints = control_plane
            .list_mount_endpoints(file_system_id)
            .await
            .context(&format!("list mount endpoints of {file_system_id}"))?;
        if let Some(endpoint) = endpoints
            .iter()
            .find(|endpoint| endpoint.lifecycle_state != LifecycleState::Available)
        {
            return Err(ProvisionError::conflict(format!(
                "mount endpoint {} of filesystem {file_system_id} is {}, not available",
                endpoint.id, endpoint.lifecycle_state
            )));
        }

        let workflow = DeleteWorkflow {
            settings: Arc::clone(&self.settings),
            account,
            space: space.to_owned(),
            file_system,
        };
        let task = self.launch(TaskId::new(), move |sink| workflow.run(sink)).await?;
        Ok(Accepted { body: (), task })
    }
}

/// Resolves the zone of every candidate subnet and pins the first one.
async fn place_in_one_zone(
    account: &Account,
    subnets: &[String],
) -> Result<(String, String), ProvisionError> {
    let mut placements = Vec::with_capacity(subnets.len());
    for subnet in subnets {
        let zone = account
            .clients
            .subnets
            .subnet_zone(subnet)
            .await
            .context(&format!("resolve availability zone of subnet {subnet}"))?;
        placements.push((subnet.clone(), zone));
    }
    placements
        .into_iter()
        .next()
        .ok_or_else(|| ProvisionError::bad_request("one-zone placement requires a subnet"))
}

/// Waits for a sub-task to finish and surfaces its failure.
async fn await_task(tasks: &dyn TaskStore, task: TaskHandle) -> Result<(), ProvisionError> {
    let task_id = task.id();
    task.wait().await?;
    let snapshot = tasks.get(task_id).await?;
    match snapshot.status {
        TaskStatus::Completed => Ok(()),
        TaskStatus::Failed => Err(ProvisionError::internal(format!(
            "task {task_id} failed: {}",
            snapshot.failure.unwrap_or_default()
        ))),
        status => Err(ProvisionError::internal(format!(
            "task {task_id} finished as {status}"
        ))),
    }
}

struct CreateWorkflow {
    orchestrator: Orchestrator,
    account: Account,
    space: String,
    file_system_id: String,
    arn: String,
    plan: ProvisionPlan,
}

impl CreateWorkflow {
    async fn run(self, sink: ProgressSink) -> Result<(), ProvisionError> {
        let mut rollback = RollbackStack::new();
        let outcome = self.provision(&sink, &mut rollback).await;
        if let Err(err) = &outcome {
            warn!(
                task_id = %sink.task_id(),
                file_system_id = %self.file_system_id,
                error = %err,
                "filesystem provisioning failed, rolling back"
            );
            sink.send(format!("provisioning failed: {err}")).await;
            let timing = self.orchestrator.settings.timing;
            let compensator =
                AccountCompensator::new(Arc::clone(&self.account.clients.control_plane), timing);
            let report = rollback.unwind(&compensator, timing.rollback_timeout).await;
            sink.send(report.summary()).await;
        }
        outcome
    }

    async fn provision(
        &self,
        sink: &ProgressSink,
        rollback: &mut RollbackStack,
    ) -> Result<(), ProvisionError> {
        let control_plane = self.account.clients.control_plane.as_ref();
        let timing = self.orchestrator.settings.timing;
        let id = self.file_system_id.as_str();
        sink.send(format!("requested creation of filesystem {id}")).await;

        // Registered before the await so a filesystem that never becomes
        // available is removed too.
        rollback.push(Compensation::DeleteFileSystem {
            file_system_id: id.to_owned(),
        });
        let file_system = await_file_system(control_plane, id, timing.await_policy).await?;
        sink.send(format!("filesystem {id} is available")).await;

        control_plane
            .set_backup_policy(id, self.plan.backup_policy)
            .await
            .context(&format!("set backup policy of {id}"))?;
        control_plane
            .set_lifecycle(id, self.plan.lifecycle)
            .await
            .context(&format!("set lifecycle configuration of {id}"))?;
        sink.send(format!(
            "applied backup policy {} and lifecycle configuration {}/{}",
            self.plan.backup_policy,
            self.plan.lifecycle.transition_to_ia,
            self.plan.lifecycle.transition_to_primary
        ))
        .await;

        if let Some(document) = resource_policy(
            &self.account.number,
            &self.space,
            &self.arn,
            self.plan.access_policy.as_ref(),
        ) {
            let text = document.to_json()?;
            control_plane
                .set_access_policy(id, &text)
                .await
                .context(&format!("set access policy of {id}"))?;
            sink.send(format!("applied access policy to filesystem {id}")).await;
        }

        let endpoint_ids = self.create_mount_endpoints(rollback).await?;
        sink.send(format!(
            "created {} mount endpoint(s) for filesystem {id}",
            endpoint_ids.len()
        ))
        .await;
        await_mount_endpoints(control_plane, id, &endpoint_ids, timing.await_policy).await?;
        sink.send(format!("mount endpoints of filesystem {id} are available")).await;

        for request in &self.plan.access_points {
            let Accepted { body, task } = self
                .orchestrator
                .start_access_point(&self.account, &file_system, request.clone())
                .await?;
            sink.send(format!("creating access point {} (task {})", body.id, task.id()))
                .await;
            await_task(self.orchestrator.tasks.as_ref(), task).await?;
            sink.send(format!("access point {} is available", body.id)).await;
        }

        sink.send(format!("filesystem {id} is ready")).await;
        Ok(())
    }

    /// Creates one endpoint per subnet. The compensation is registered with
    /// whatever was created, even when a later endpoint fails.
    async fn create_mount_endpoints(
        &self,
        rollback: &mut RollbackStack,
    ) -> Result<Vec<String>, ProvisionError> {
        let control_plane = self.account.clients.control_plane.as_ref();
        let mut endpoint_ids = Vec::with_capacity(self.plan.subnets.len());
        let mut failure = None;
        for subnet in &self.plan.subnets {
            let spec = MountEndpointSpec {
                file_system_id: self.file_system_id.clone(),
                subnet_id: subnet.clone(),
                security_groups: self.plan.security_groups.clone(),
            };
            match control_plane.create_mount_endpoint(&spec).await {
                Ok(endpoint) => endpoint_ids.push(endpoint.id),
                Err(err) => {
                    failure = Some(ProvisionError::from_provider(
                        &format!("create mount endpoint in {subnet}"),
                        &err,
                    ));
                    break;
                }
            }
        }

        rollback.push(Compensation::DeleteMountEndpoints {
            file_system_id: self.file_system_id.clone(),
            endpoint_ids: endpoint_ids.clone(),
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(endpoint_ids),
        }
    }
}

struct UpdateWorkflow {
    settings: Arc<OrchestratorSettings>,
    account: Account,
    space: String,
    file_system: FileSystem,
    backup_policy: Option<BackupPolicy>,
    lifecycle: Option<LifecycleConfiguration>,
    policy: PolicyChange,
    tags: Option<Vec<Tag>>,
}

impl UpdateWorkflow {
    async fn run(self, sink: ProgressSink) -> Result<(), ProvisionError> {
        let control_plane = self.account.clients.control_plane.as_ref();
        let id = self.file_system.id.as_str();

        if let Some(policy) = self.backup_policy {
            control_plane
                .set_backup_policy(id, policy)
                .await
                .context(&format!("set backup policy of {id}"))?;
            sink.send(format!("updated backup policy of filesystem {id} to {policy}")).await;
        }

        if let Some(lifecycle) = self.lifecycle {
            control_plane
                .set_lifecycle(id, lifecycle)
                .await
                .context(&format!("set lifecycle configuration of {id}"))?;
            sink.send(format!(
                "updated lifecycle configuration of filesystem {id} to {}/{}",
                lifecycle.transition_to_ia, lifecycle.transition_to_primary
            ))
            .await;
        }

        match &self.policy {
            PolicyChange::Keep => {}
            PolicyChange::Replace(document) => {
                control_plane
                    .set_access_policy(id, document)
                    .await
                    .context(&format!("set access policy of {id}"))?;
                sink.send(format!("updated access policy of filesystem {id}")).await;
            }
            PolicyChange::Clear => {
                control_plane
                    .delete_access_policy(id)
                    .await
                    .context(&format!("delete access policy of {id}"))?;
                sink.send(format!("removed access policy of filesystem {id}")).await;
            }
        }

        if let Some(tags) = &self.tags {
            control_plane
                .tag_resource(id, tags)
                .await
                .context(&format!("tag filesystem {id}"))?;
            sink.send(format!("updated tags of filesystem {id}")).await;

            let users = FileSystemUsers::new(
                self.account.clients.identity.as_ref(),
                &self.settings,
                &self.space,
                &self.file_system.name,
            );
            let refreshed = users.refresh_tags(tags).await?;
            sink.send(format!("refreshed tags of {refreshed} user(s)")).await;
        }

        sink.send(format!("filesystem {id} updated")).await;
        Ok(())
    }
}

struct DeleteWorkflow {
    settings: Arc<OrchestratorSettings>,
    account: Account,
    space: String,
    file_system: FileSystem,
}

impl DeleteWorkflow {
    async fn run(self, sink: ProgressSink) -> Result<(), ProvisionError> {
        let control_plane = self.account.clients.control_plane.as_ref();
        let timing = self.settings.timing;
        let id = self.file_system.id.as_str();
        sink.send(format!("deleting filesystem {id}")).await;

        let users = FileSystemUsers::new(
            self.account.clients.identity.as_ref(),
            &self.settings,
            &self.space,
            &self.file_system.name,
        );
        let sweep = users.delete_all().await?;
        for (user, reason) in &sweep.failed {
            sink.send(format!("failed to delete user {user}: {reason}")).await;
        }
        sink.send(format!("deleted {} user(s)", sweep.deleted.len())).await;

        let endpoints = control_plane
            .list_mount_endpoints(id)
            .await
            .context(&format!("list mount endpoints of {id}"))?;
        for endpoint in &endpoints {
            if endpoint.lifecycle_state != LifecycleState::Available {
                return Err(ProvisionError::conflict(format!(
                    "mount endpoint {} is {}, not available",
                    endpoint.id, endpoint.lifecycle_state
                )));
            }
            delete_mount_endpoint(control_plane, &endpoint.id).await?;
        }
        await_no_mount_endpoints(control_plane, id, timing.await_policy).await?;
        sink.send(format!("deleted {} mount endpoint(s)", endpoints.len())).await;

        let access_points = delete_access_points(control_plane, id).await?;
        sink.send(format!("deleted {} access point(s)", access_points.len())).await;

        delete_file_system(control_plane, id, timing.delete_policy).await?;
        sink.send(format!("deleted filesystem {id}")).await;
        Ok(())
    }
}
