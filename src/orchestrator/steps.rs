//! Provider steps shared by the workflows and their compensations.

use std::sync::Arc;

use tracing::{debug, info};

use super::WorkflowTiming;
use crate::error::{ProviderResultExt, ProvisionError};
use crate::provider::{AccessPoint, ControlPlane, FileSystem, LifecycleState, MountEndpoint};
use crate::retry::{RetryError, RetryPolicy, retry};
use crate::rollback::{Compensation, CompensationFuture, Compensator};

fn not_ready(what: &str, state: LifecycleState) -> RetryError<ProvisionError> {
    RetryError::Transient(ProvisionError::conflict(format!(
        "{what} is {state}, waiting for available"
    )))
}

fn failed(what: &str) -> RetryError<ProvisionError> {
    RetryError::Stop(ProvisionError::internal(format!("{what} entered the error state")))
}

/// Polls until the filesystem is available.
pub(super) async fn await_file_system(
    control_plane: &dyn ControlPlane,
    file_system_id: &str,
    policy: RetryPolicy,
) -> Result<FileSystem, ProvisionError> {
    let label = format!("filesystem {file_system_id}");
    let what = label.as_str();
    retry(policy, move || async move {
        let file_system = control_plane
            .get_file_system(file_system_id)
            .await
            .context(&format!("describe {what}"))?;
        match file_system.lifecycle_state {
            LifecycleState::Available => Ok(file_system),
            LifecycleState::Error => Err(failed(what)),
            state => Err(not_ready(what, state)),
        }
    })
    .await
}

/// Polls until every endpoint in `endpoint_ids` is available.
pub(super) async fn await_mount_endpoints(
    control_plane: &dyn ControlPlane,
    file_system_id: &str,
    endpoint_ids: &[String],
    policy: RetryPolicy,
) -> Result<Vec<MountEndpoint>, ProvisionError> {
    retry(policy, move || async move {
        let endpoints = control_plane
            .list_mount_endpoints(file_system_id)
            .await
            .context(&format!("list mount endpoints of {file_system_id}"))?;
        for id in endpoint_ids {
            let what = format!("mount endpoint {id}");
            let Some(endpoint) = endpoints.iter().find(|endpoint| &endpoint.id == id) else {
                return Err(RetryError::Transient(ProvisionError::not_found(format!(
                    "{what} not listed yet"
                ))));
            };
            match endpoint.lifecycle_state {
                LifecycleState::Available => {}
                LifecycleState::Error => return Err(failed(&what)),
                state => return Err(not_ready(&what, state)),
            }
        }
        Ok(endpoints)
    })
    .await
}

/// Polls until the access point is available.
pub(super) async fn await_access_point(
    control_plane: &dyn ControlPlane,
    access_point_id: &str,
    policy: RetryPolicy,
) -> Result<AccessPoint, ProvisionError> {
    let label = format!("access point {access_point_id}");
    let what = label.as_str();
    retry(policy, move || async move {
        let access_point = control_plane
            .get_access_point(access_point_id)
            .await
            .context(&format!("describe {what}"))?;
        match access_point.lifecycle_state {
            LifecycleState::Available => Ok(access_point),
            LifecycleState::Error => Err(failed(what)),
            state => Err(not_ready(what, state)),
        }
    })
    .await
}

/// Polls until the filesystem reports no mount endpoints.
pub(super) async fn await_no_mount_endpoints(
    control_plane: &dyn ControlPlane,
    file_system_id: &str,
    policy: RetryPolicy,
) -> Result<(), ProvisionError> {
    retry(policy, move || async move {
        let file_system = control_plane
            .get_file_system(file_system_id)
            .await
            .context(&format!("describe filesystem {file_system_id}"))?;
        if file_system.number_of_mount_targets == 0 {
            return Ok(());
        }
        Err(RetryError::Transient(ProvisionError::conflict(format!(
            "filesystem {file_system_id} still has {} mount endpoint(s)",
            file_system.number_of_mount_targets
        ))))
    })
    .await
}

/// Deletes a mount endpoint, treating a missing endpoint as deleted.
pub(super) async fn delete_mount_endpoint(
    control_plane: &dyn ControlPlane,
    endpoint_id: &str,
) -> Result<(), ProvisionError> {
    match control_plane.delete_mount_endpoint(endpoint_id).await {
        Err(err) if !err.is_not_found() => Err(ProvisionError::from_provider(
            &format!("delete mount endpoint {endpoint_id}"),
            &err,
        )),
        _ => Ok(()),
    }
}

/// Deletes an access point, treating a missing access point as deleted.
pub(super) async fn delete_access_point(
    control_plane: &dyn ControlPlane,
    access_point_id: &str,
) -> Result<(), ProvisionError> {
    match control_plane.delete_access_point(access_point_id).await {
        Err(err) if !err.is_not_found() => Err(ProvisionError::from_provider(
            &format!("delete access point {access_point_id}"),
            &err,
        )),
        _ => Ok(()),
    }
}

/// Deletes every access point of a filesystem and returns their ids.
pub(super) async fn delete_access_points(
    control_plane: &dyn ControlPlane,
    file_system_id: &str,
) -> Result<Vec<String>, ProvisionError> {
    let access_points = control_plane
        .list_access_points(file_system_id)
        .await
        .context(&format!("list access points of {file_system_id}"))?;
    let mut deleted = Vec::with_capacity(access_points.len());
    for access_point in access_points {
        delete_access_point(control_plane, &access_point.id).await?;
        deleted.push(access_point.id);
    }
    Ok(deleted)
}

/// Deletes the filesystem, retrying while the provider still reports it in
/// use. A filesystem that is already gone counts as deleted.
pub(super) async fn delete_file_system(
    control_plane: &dyn ControlPlane,
    file_system_id: &str,
    policy: RetryPolicy,
) -> Result<(), ProvisionError> {
    retry(policy, move || async move {
        match control_plane.delete_file_system(file_system_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(file_system_id, "filesystem already deleted");
                Ok(())
            }
            Err(err) => Err(RetryError::Transient(ProvisionError::from_provider(
                &format!("delete filesystem {file_system_id}"),
                &err,
            ))),
        }
    })
    .await
}

/// Runs compensations against one account's control plane.
#[derive(Clone)]
pub struct AccountCompensator {
    control_plane: Arc<dyn ControlPlane>,
    timing: WorkflowTiming,
}

impl AccountCompensator {
    /// Creates a compensator for one account.
    #[must_use]
    pub const fn new(control_plane: Arc<dyn ControlPlane>, timing: WorkflowTiming) -> Self {
        Self {
            control_plane,
            timing,
        }
    }

    async fn run(&self, action: &Compensation) -> Result<(), ProvisionError> {
        let control_plane = self.control_plane.as_ref();
        match action {
            Compensation::DeleteFileSystem { file_system_id } => {
                let removed = delete_access_points(control_plane, file_system_id).await?;
                if !removed.is_empty() {
                    info!(file_system_id, access_points = ?removed, "deleted access points");
                }
                delete_file_system(control_plane, file_system_id, self.timing.delete_policy).await
            }
            Compensation::DeleteMountEndpoints {
                file_system_id,
                endpoint_ids,
            } => {
                for endpoint_id in endpoint_ids {
                    delete_mount_endpoint(control_plane, endpoint_id).await?;
                }
                await_no_mount_endpoints(control_plane, file_system_id, self.timing.await_policy)
                    .await
            }
            Compensation::DeleteAccessPoint { access_point_id } => {
                delete_access_point(control_plane, access_point_id).await
            }
        }
    }
}

impl Compensator for AccountCompensator {
    fn compensate<'a>(&'a self, action: &'a Compensation) -> CompensationFuture<'a> {
        Box::pin(self.run(action))
    }
}
