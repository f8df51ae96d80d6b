//! Access point create, list, describe, and delete.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::Orchestrator;
use super::requests::{Accepted, AccessPointCreateRequest};
use super::steps::await_access_point;
use crate::accounts::Account;
use crate::error::{ProviderResultExt, ProvisionError};
use crate::provider::{AccessPoint, AccessPointSpec, FileSystem};
use crate::tags::access_point_tags;
use crate::task::TaskId;

impl Orchestrator {
    /// Starts creating an access point on a visible filesystem.
    ///
    /// The returned access point carries the state reported by the create
    /// call; the tracked task completes once it is available.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space`, or the
    /// classified provider error of a failed create call.
    pub async fn create_access_point(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
        request: AccessPointCreateRequest,
    ) -> Result<Accepted<AccessPoint>, ProvisionError> {
        let account = self.account(account)?;
        self.require_visible(account, space, file_system_id).await?;
        let file_system = account
            .clients
            .control_plane
            .get_file_system(file_system_id)
            .await
            .context(&format!("describe filesystem {file_system_id}"))?;
        self.start_access_point(account, &file_system, request).await
    }

    /// Issues the create call and tracks the access point until available.
    pub(super) async fn start_access_point(
        &self,
        account: &Account,
        file_system: &FileSystem,
        request: AccessPointCreateRequest,
    ) -> Result<Accepted<AccessPoint>, ProvisionError> {
        let name = if request.name.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            request.name
        };
        let spec = AccessPointSpec {
            file_system_id: file_system.id.clone(),
            posix_user: request.posix_user,
            root_directory: request.root_directory,
            tags: access_point_tags(&file_system.tags, &file_system.name, &name),
        };

        let task_id = TaskId::new();
        let access_point = account
            .clients
            .control_plane
            .create_access_point(&spec, &task_id.token())
            .await
            .context(&format!(
                "create access point {name} on filesystem {}",
                file_system.id
            ))?;
        info!(
            task_id = %task_id,
            file_system_id = %file_system.id,
            access_point_id = %access_point.id,
            "access point create accepted"
        );

        let control_plane = Arc::clone(&account.clients.control_plane);
        let policy = self.settings.timing.await_policy;
        let access_point_id = access_point.id.clone();
        let task = self
            .launch(task_id, move |sink| async move {
                sink.send(format!("requested creation of access point {access_point_id}"))
                    .await;
                await_access_point(control_plane.as_ref(), &access_point_id, policy).await?;
                sink.send(format!("access point {access_point_id} is available"))
                    .await;
                Ok(())
            })
            .await?;

        Ok(Accepted {
            body: access_point,
            task,
        })
    }

    /// Lists the access points of a visible filesystem.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space`.
    pub async fn list_access_points(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
    ) -> Result<Vec<AccessPoint>, ProvisionError> {
        let account = self.account(account)?;
        self.require_visible(account, space, file_system_id).await?;
        account
            .clients
            .control_plane
            .list_access_points(file_system_id)
            .await
            .context(&format!("list access points of {file_system_id}"))
    }

    /// Describes one access point of a visible filesystem.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space` and the
    /// access point belongs to it.
    pub async fn get_access_point(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
        access_point_id: &str,
    ) -> Result<AccessPoint, ProvisionError> {
        let account = self.account(account)?;
        self.require_visible(account, space, file_system_id).await?;
        owned_access_point(account, file_system_id, access_point_id).await
    }

    /// Deletes one access point of a visible filesystem.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space` and the
    /// access point belongs to it, or the classified provider error of a
    /// failed delete.
    pub async fn delete_access_point(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
        access_point_id: &str,
    ) -> Result<(), ProvisionError> {
        let account = self.account(account)?;
        self.require_visible(account, space, file_system_id).await?;
        owned_access_point(account, file_system_id, access_point_id).await?;
        account
            .clients
            .control_plane
            .delete_access_point(access_point_id)
            .await
            .context(&format!("delete access point {access_point_id}"))?;
        info!(file_system_id, access_point_id, "deleted access point");
        Ok(())
    }
}

async fn owned_access_point(
    account: &Account,
    file_system_id: &str,
    access_point_id: &str,
) -> Result<AccessPoint, ProvisionError> {
    let access_point = account
        .clients
        .control_plane
        .get_access_point(access_point_id)
        .await
        .context(&format!("describe access point {access_point_id}"))?;
    if access_point.file_system_id != file_system_id {
        return Err(ProvisionError::not_found(format!(
            "access point {access_point_id} not found on filesystem {file_system_id}"
        )));
    }
    Ok(access_point)
}
