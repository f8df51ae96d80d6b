//! BDD step definitions for the provisioning workflows.

use std::future::Future;

use fsorch::provider::LifecycleState;
use fsorch::{
    Accepted, AccessPointCreateRequest, FileSystemUpdateRequest, InMemoryTaskStore,
    ProvisionError, TaskSnapshot, TaskStore, UserCreateRequest,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{ACCOUNT, Outcome, ProvisioningContext};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn block_on<F: Future>(future: F) -> Result<F::Output, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    Ok(runtime.block_on(future))
}

async fn finish<T>(
    tasks: &InMemoryTaskStore,
    accepted: Accepted<T>,
) -> Result<TaskSnapshot, ProvisionError> {
    let id = accepted.task_id();
    accepted.task.wait().await?;
    Ok(tasks.get(id).await?)
}

fn split_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn provisioned(context: &ProvisioningContext) -> Result<(String, String), StepError> {
    match (context.space(), context.file_system_id()) {
        (Some(space), Some(id)) => Ok((space, id)),
        _ => Err(StepError::Assertion(String::from(
            "no filesystem has been provisioned",
        ))),
    }
}

fn parse_state(state: &str) -> Result<LifecycleState, StepError> {
    match state {
        "creating" => Ok(LifecycleState::Creating),
        "available" => Ok(LifecycleState::Available),
        "updating" => Ok(LifecycleState::Updating),
        "deleting" => Ok(LifecycleState::Deleting),
        "error" => Ok(LifecycleState::Error),
        _ => Err(StepError::Assertion(format!("unknown lifecycle state: {state}"))),
    }
}

fn finished(context: &ProvisioningContext) -> Result<TaskSnapshot, StepError> {
    match context.outcome() {
        Some(Outcome::Finished(snapshot)) => Ok(snapshot),
        Some(Outcome::Rejected(err)) => Err(StepError::Assertion(format!(
            "expected an accepted request, got rejection: {err}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[given("a provisioning orchestrator")]
fn provisioning_orchestrator(provisioning_context: &ProvisioningContext) {
    let _ = provisioning_context;
}

#[given("a filesystem request named \"{name}\"")]
fn request_named(provisioning_context: &ProvisioningContext, name: String) {
    provisioning_context.update_request(|request| request.name = name);
}

#[given("the request asks for access points \"{names}\"")]
fn request_access_points(provisioning_context: &ProvisioningContext, names: String) {
    provisioning_context.update_request(|request| {
        request.access_points = split_names(&names)
            .into_iter()
            .map(|name| AccessPointCreateRequest {
                name,
                ..AccessPointCreateRequest::default()
            })
            .collect();
    });
}

#[given("access point creation fails on call \"{call}\"")]
fn access_point_creation_fails(provisioning_context: &ProvisioningContext, call: usize) {
    provisioning_context
        .cloud
        .control_plane
        .fail_access_point_create(call);
}

#[given("the filesystem is provisioned in space \"{space}\"")]
fn filesystem_provisioned(
    provisioning_context: &ProvisioningContext,
    space: String,
) -> Result<(), StepError> {
    let orchestrator = provisioning_context.orchestrator.clone();
    let tasks = provisioning_context.tasks.clone();
    let request = provisioning_context.request();
    let (id, snapshot) = block_on(async {
        let accepted = orchestrator
            .create_filesystem(ACCOUNT, &space, request)
            .await?;
        let id = accepted.body.id.clone();
        let snapshot = finish(&tasks, accepted).await?;
        Ok::<_, ProvisionError>((id, snapshot))
    })??;
    if snapshot.status.as_str() != "completed" {
        return Err(StepError::Assertion(format!(
            "provisioning should complete: {snapshot:?}"
        )));
    }
    provisioning_context.record_file_system(&space, id);
    Ok(())
}

#[given("the filesystem has users \"{names}\"")]
fn filesystem_users(
    provisioning_context: &ProvisioningContext,
    names: String,
) -> Result<(), StepError> {
    let (space, id) = provisioned(provisioning_context)?;
    let orchestrator = provisioning_context.orchestrator.clone();
    block_on(async {
        for user_name in split_names(&names) {
            orchestrator
                .create_user(ACCOUNT, &space, &id, UserCreateRequest { user_name })
                .await?;
        }
        Ok::<_, ProvisionError>(())
    })??;
    Ok(())
}

#[given("deleting user \"{name}\" fails")]
fn user_delete_fails(provisioning_context: &ProvisioningContext, name: String) {
    let file_system_name = provisioning_context.request().name;
    provisioning_context
        .cloud
        .identity
        .fail_user_delete(&format!("{file_system_name}-{name}"));
}

#[given("the filesystem is in state \"{state}\"")]
fn filesystem_in_state(
    provisioning_context: &ProvisioningContext,
    state: String,
) -> Result<(), StepError> {
    let (_, id) = provisioned(provisioning_context)?;
    provisioning_context
        .cloud
        .control_plane
        .set_file_system_state(&id, parse_state(&state)?);
    Ok(())
}

#[when("I provision the filesystem in space \"{space}\"")]
fn provision_filesystem(
    provisioning_context: &ProvisioningContext,
    space: String,
) -> Result<(), StepError> {
    let orchestrator = provisioning_context.orchestrator.clone();
    let tasks = provisioning_context.tasks.clone();
    let request = provisioning_context.request();
    let outcome = block_on(async {
        match orchestrator.create_filesystem(ACCOUNT, &space, request).await {
            Ok(accepted) => {
                let id = accepted.body.id.clone();
                let snapshot = finish(&tasks, accepted).await?;
                Ok::<_, ProvisionError>((Some(id), Outcome::Finished(snapshot)))
            }
            Err(err) => Ok((None, Outcome::Rejected(err))),
        }
    })??;
    if let (Some(id), _) = &outcome {
        provisioning_context.record_file_system(&space, id.clone());
    }
    provisioning_context.set_outcome(outcome.1);
    Ok(())
}

#[when("I delete the filesystem in space \"{space}\"")]
fn delete_filesystem(
    provisioning_context: &ProvisioningContext,
    space: String,
) -> Result<(), StepError> {
    let (_, id) = provisioned(provisioning_context)?;
    let orchestrator = provisioning_context.orchestrator.clone();
    let tasks = provisioning_context.tasks.clone();
    let outcome = block_on(async {
        match orchestrator.delete_filesystem(ACCOUNT, &space, &id).await {
            Ok(accepted) => Ok::<_, ProvisionError>(Outcome::Finished(
                finish(&tasks, accepted).await?,
            )),
            Err(err) => Ok(Outcome::Rejected(err)),
        }
    })??;
    provisioning_context.set_outcome(outcome);
    Ok(())
}

#[when("I update the lifecycle configuration to \"{value}\"")]
fn update_lifecycle(
    provisioning_context: &ProvisioningContext,
    value: String,
) -> Result<(), StepError> {
    let (space, id) = provisioned(provisioning_context)?;
    let orchestrator = provisioning_context.orchestrator.clone();
    let tasks = provisioning_context.tasks.clone();
    let request = FileSystemUpdateRequest {
        lifecycle_configuration: value,
        ..FileSystemUpdateRequest::default()
    };
    let outcome = block_on(async {
        match orchestrator
            .update_filesystem(ACCOUNT, &space, &id, request)
            .await
        {
            Ok(accepted) => Ok::<_, ProvisionError>(Outcome::Finished(
                finish(&tasks, accepted).await?,
            )),
            Err(err) => Ok(Outcome::Rejected(err)),
        }
    })??;
    provisioning_context.set_outcome(outcome);
    Ok(())
}

#[then("the task status is \"{status}\"")]
fn task_status(provisioning_context: &ProvisioningContext, status: String) -> Result<(), StepError> {
    let snapshot = finished(provisioning_context)?;
    if snapshot.status.as_str() == status {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected task status {status}, got {snapshot:?}"
        )))
    }
}

#[then("the task log contains \"{message}\"")]
fn task_log_contains(
    provisioning_context: &ProvisioningContext,
    message: String,
) -> Result<(), StepError> {
    let snapshot = finished(provisioning_context)?;
    if snapshot.log.iter().any(|line| *line == message) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "task log lacks {message:?}: {:?}",
            snapshot.log
        )))
    }
}

#[then("the filesystem has backup policy \"{backup}\" and lifecycle \"{lifecycle}\"")]
fn filesystem_settings(
    provisioning_context: &ProvisioningContext,
    backup: String,
    lifecycle: String,
) -> Result<(), StepError> {
    let (space, id) = provisioned(provisioning_context)?;
    let orchestrator = provisioning_context.orchestrator.clone();
    let described =
        block_on(async { orchestrator.get_filesystem(ACCOUNT, &space, &id).await })??;
    let actual = (
        described.backup_policy.as_str(),
        described.lifecycle_configuration.as_str(),
    );
    if actual == (backup.as_str(), lifecycle.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected backup {backup} and lifecycle {lifecycle}, got {actual:?}"
        )))
    }
}

#[then("the filesystem has \"{count}\" mount endpoints")]
fn mount_endpoint_count(
    provisioning_context: &ProvisioningContext,
    count: usize,
) -> Result<(), StepError> {
    let (_, id) = provisioned(provisioning_context)?;
    let endpoints = provisioning_context.cloud.control_plane.mount_endpoints(&id);
    if endpoints.len() == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} mount endpoints, got {}",
            endpoints.len()
        )))
    }
}

#[then("no filesystem resources remain")]
fn no_resources_remain(provisioning_context: &ProvisioningContext) -> Result<(), StepError> {
    let (_, id) = provisioned(provisioning_context)?;
    let control_plane = &provisioning_context.cloud.control_plane;
    let remaining = (
        control_plane.file_systems().len(),
        control_plane.mount_endpoints(&id).len(),
        control_plane.access_points(&id).len(),
    );
    if remaining == (0, 0, 0) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no filesystems, endpoints, or access points, got {remaining:?}"
        )))
    }
}

#[then("the filesystem is deleted after its dependents")]
fn deleted_last(provisioning_context: &ProvisioningContext) -> Result<(), StepError> {
    let (_, id) = provisioned(provisioning_context)?;
    let entries = provisioning_context.cloud.journal.entries();
    let last_of = |prefix: &str| entries.iter().rposition(|entry| entry.starts_with(prefix));
    let first_of = |prefix: &str| entries.iter().position(|entry| entry.starts_with(prefix));
    let file_system_deleted = entries
        .iter()
        .position(|entry| *entry == format!("delete_file_system {id}"))
        .ok_or_else(|| StepError::Assertion(format!("filesystem {id} was not deleted")))?;

    let ordered = [
        (last_of("delete_user "), first_of("delete_mount_endpoint ")),
        (last_of("delete_mount_endpoint "), first_of("delete_access_point ")),
        (last_of("delete_access_point "), Some(file_system_deleted)),
    ]
    .iter()
    .all(|pair| matches!(pair, (Some(before), Some(after)) if before < after));
    if ordered {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected delete order: {entries:?}"
        )))
    }
}

#[then("the request is rejected with \"{kind}\"")]
fn request_rejected(provisioning_context: &ProvisioningContext, kind: String) -> Result<(), StepError> {
    match provisioning_context.outcome() {
        Some(Outcome::Rejected(err)) if err.kind.to_string() == kind => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a {kind} rejection, got {other:?}"
        ))),
    }
}

#[then("nothing is deleted")]
fn nothing_deleted(provisioning_context: &ProvisioningContext) -> Result<(), StepError> {
    let entries = provisioning_context.cloud.journal.entries();
    if entries.iter().any(|entry| entry.starts_with("delete_")) {
        return Err(StepError::Assertion(format!(
            "expected no deletes, got {entries:?}"
        )));
    }
    Ok(())
}
