//! Identity principals scoped to one filesystem.
//!
//! A user named `bob` on filesystem `alpha` is stored as `alpha-bob` under
//! `/<prefix>/<org>/<space>/alpha/`, tagged like the filesystem plus a
//! `ResourceName` tag that the org's admin policy matches against.

use tracing::{info, warn};

use super::requests::{UserCreateRequest, UserResponse, UserUpdateRequest};
use super::{Orchestrator, OrchestratorSettings};
use crate::error::{ProviderResultExt, ProvisionError};
use crate::provider::{AccessKey, FileSystem, IdentityProvider, IdentityUser};
use crate::tags::{Tag, user_tags};

/// Outcome of deleting every user of a filesystem.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserSweep {
    /// Short names of the deleted users.
    pub deleted: Vec<String>,
    /// Short names and failure reasons of users that could not be deleted.
    pub failed: Vec<(String, String)>,
}

/// Users of one filesystem in one space.
pub(super) struct FileSystemUsers<'a> {
    identity: &'a dyn IdentityProvider,
    settings: &'a OrchestratorSettings,
    space: &'a str,
    file_system_name: &'a str,
}

impl<'a> FileSystemUsers<'a> {
    pub(super) const fn new(
        identity: &'a dyn IdentityProvider,
        settings: &'a OrchestratorSettings,
        space: &'a str,
        file_system_name: &'a str,
    ) -> Self {
        Self {
            identity,
            settings,
            space,
            file_system_name,
        }
    }

    fn path(&self) -> String {
        self.settings.user_path(self.space, self.file_system_name)
    }

    fn full_name(&self, user: &str) -> String {
        format!("{}-{user}", self.file_system_name)
    }

    fn short_name(&self, full_name: &str) -> String {
        let prefix = format!("{}-", self.file_system_name);
        full_name
            .strip_prefix(&prefix)
            .unwrap_or(full_name)
            .to_owned()
    }

    fn tags(&self, full_name: &str, resource_tags: &[Tag]) -> Vec<Tag> {
        user_tags(
            &self.settings.tag_keys,
            &self.settings.org,
            self.space,
            full_name,
            self.file_system_name,
            resource_tags,
        )
    }

    fn response(&self, user: IdentityUser) -> UserResponse {
        UserResponse {
            user_name: self.short_name(&user.name),
            arn: user.arn,
            tags: user.tags,
            ..UserResponse::default()
        }
    }

    async fn create(&self, user: &str, resource_tags: &[Tag]) -> Result<IdentityUser, ProvisionError> {
        let full_name = self.full_name(user);
        let tags = self.tags(&full_name, resource_tags);
        let created = self
            .identity
            .create_user(&full_name, &self.path(), &tags)
            .await
            .context(&format!("create user {full_name}"))?;
        let group = self.settings.admin_group_name();
        self.identity
            .add_user_to_group(&full_name, &group)
            .await
            .context(&format!("add user {full_name} to group {group}"))?;
        Ok(created)
    }

    async fn get(&self, user: &str) -> Result<IdentityUser, ProvisionError> {
        let full_name = self.full_name(user);
        self.identity
            .get_user(&full_name, &self.path())
            .await
            .context(&format!("get user {full_name}"))
    }

    /// Removes group memberships and access keys, then the user itself.
    async fn delete(&self, user: &str) -> Result<(), ProvisionError> {
        let full_name = self.full_name(user);
        self.get(user).await?;

        let groups = self
            .identity
            .list_groups_for_user(&full_name)
            .await
            .context(&format!("list groups of user {full_name}"))?;
        for group in &groups {
            self.identity
                .remove_user_from_group(&full_name, group)
                .await
                .context(&format!("remove user {full_name} from group {group}"))?;
        }

        let keys = self
            .identity
            .list_access_keys(&full_name)
            .await
            .context(&format!("list access keys of user {full_name}"))?;
        for key in &keys {
            self.identity
                .delete_access_key(&full_name, &key.access_key_id)
                .await
                .context(&format!(
                    "delete access key {} of user {full_name}",
                    key.access_key_id
                ))?;
        }

        self.identity
            .delete_user(&full_name)
            .await
            .context(&format!("delete user {full_name}"))
    }

    async fn list(&self) -> Result<Vec<IdentityUser>, ProvisionError> {
        let path = self.path();
        self.identity
            .list_users(&path)
            .await
            .context(&format!("list users under {path}"))
    }

    /// Deletes every user, continuing past individual failures.
    pub(super) async fn delete_all(&self) -> Result<UserSweep, ProvisionError> {
        let mut sweep = UserSweep::default();
        for user in self.list().await? {
            let short_name = self.short_name(&user.name);
            match self.delete(&short_name).await {
                Ok(()) => sweep.deleted.push(short_name),
                Err(err) => {
                    warn!(
                        file_system = self.file_system_name,
                        user = %short_name,
                        error = %err,
                        "failed to delete filesystem user"
                    );
                    sweep.failed.push((short_name, err.to_string()));
                }
            }
        }
        Ok(sweep)
    }

    /// Re-tags every user from the filesystem's tags and returns how many
    /// were updated.
    pub(super) async fn refresh_tags(&self, resource_tags: &[Tag]) -> Result<usize, ProvisionError> {
        let users = self.list().await?;
        for user in &users {
            let tags = self.tags(&user.name, resource_tags);
            self.identity
                .tag_user(&user.name, &tags)
                .await
                .context(&format!("tag user {}", user.name))?;
        }
        Ok(users.len())
    }

    /// Issues a new access key and deletes the previous ones.
    async fn rotate_key(&self, user: &str) -> Result<(AccessKey, Vec<String>), ProvisionError> {
        let full_name = self.full_name(user);
        let previous = self
            .identity
            .list_access_keys(&full_name)
            .await
            .context(&format!("list access keys of user {full_name}"))?;
        let issued = self
            .identity
            .create_access_key(&full_name)
            .await
            .context(&format!("create access key for user {full_name}"))?;

        let mut deleted = Vec::with_capacity(previous.len());
        for key in previous {
            self.identity
                .delete_access_key(&full_name, &key.access_key_id)
                .await
                .context(&format!(
                    "delete access key {} of user {full_name}",
                    key.access_key_id
                ))?;
            deleted.push(key.access_key_id);
        }
        Ok((issued, deleted))
    }
}

impl Orchestrator {
    /// Creates a user for a visible filesystem and adds it to the org's
    /// admin group, preparing the account first.
    ///
    /// # Errors
    ///
    /// Returns a bad request for an empty user name, not found unless the
    /// filesystem is visible in `space`, or the classified provider error of
    /// a failed identity call.
    pub async fn create_user(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
        request: UserCreateRequest,
    ) -> Result<UserResponse, ProvisionError> {
        if request.user_name.trim().is_empty() {
            return Err(ProvisionError::bad_request("user name is required"));
        }
        let file_system = self.visible_file_system(account, space, file_system_id).await?;
        self.prepare_account(account).await?;

        let identity = self.account(account)?.clients.identity.as_ref();
        let users = FileSystemUsers::new(identity, &self.settings, space, &file_system.name);
        let created = users.create(&request.user_name, &file_system.tags).await?;
        info!(file_system_id, user = %created.name, "created filesystem user");
        Ok(users.response(created))
    }

    /// Deletes a user of a visible filesystem together with its group
    /// memberships and access keys.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space` and the
    /// user exists under the filesystem's path.
    pub async fn delete_user(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
        user_name: &str,
    ) -> Result<(), ProvisionError> {
        let file_system = self.visible_file_system(account, space, file_system_id).await?;
        let identity = self.account(account)?.clients.identity.as_ref();
        FileSystemUsers::new(identity, &self.settings, space, &file_system.name)
            .delete(user_name)
            .await?;
        info!(file_system_id, user = user_name, "deleted filesystem user");
        Ok(())
    }

    /// Lists short user names of a visible filesystem.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space`.
    pub async fn list_users(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
    ) -> Result<Vec<String>, ProvisionError> {
        let file_system = self.visible_file_system(account, space, file_system_id).await?;
        let identity = self.account(account)?.clients.identity.as_ref();
        let users = FileSystemUsers::new(identity, &self.settings, space, &file_system.name);
        Ok(users
            .list()
            .await?
            .iter()
            .map(|user| users.short_name(&user.name))
            .collect())
    }

    /// Describes a user of a visible filesystem, including its access keys.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space` and the
    /// user exists under the filesystem's path.
    pub async fn get_user(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
        user_name: &str,
    ) -> Result<UserResponse, ProvisionError> {
        let file_system = self.visible_file_system(account, space, file_system_id).await?;
        let identity = self.account(account)?.clients.identity.as_ref();
        let users = FileSystemUsers::new(identity, &self.settings, space, &file_system.name);
        let user = users.get(user_name).await?;
        let access_keys = identity
            .list_access_keys(&user.name)
            .await
            .context(&format!("list access keys of user {}", user.name))?;
        Ok(UserResponse {
            access_keys,
            ..users.response(user)
        })
    }

    /// Rotates the access key and/or replaces the tags of a user.
    ///
    /// # Errors
    ///
    /// Returns not found unless the filesystem is visible in `space` and the
    /// user exists under the filesystem's path.
    pub async fn update_user(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
        user_name: &str,
        request: UserUpdateRequest,
    ) -> Result<UserResponse, ProvisionError> {
        let file_system = self.visible_file_system(account, space, file_system_id).await?;
        let identity = self.account(account)?.clients.identity.as_ref();
        let users = FileSystemUsers::new(identity, &self.settings, space, &file_system.name);
        let user = users.get(user_name).await?;
        let mut response = UserResponse {
            user_name: user_name.to_owned(),
            arn: user.arn.clone(),
            tags: user.tags.clone(),
            ..UserResponse::default()
        };

        if request.reset_key {
            let (issued, deleted) = users.rotate_key(user_name).await?;
            info!(
                file_system_id,
                user = %user.name,
                deleted = deleted.len(),
                "rotated access key"
            );
            response.access_key = Some(issued);
            response.deleted_access_keys = deleted;
        }

        if let Some(client_tags) = &request.tags {
            let tags = users.tags(&user.name, client_tags);
            identity
                .tag_user(&user.name, &tags)
                .await
                .context(&format!("tag user {}", user.name))?;
            response.tags = tags;
        }

        Ok(response)
    }

    /// Resolves a filesystem after checking it is visible in `space`.
    async fn visible_file_system(
        &self,
        account: &str,
        space: &str,
        file_system_id: &str,
    ) -> Result<FileSystem, ProvisionError> {
        let account = self.account(account)?;
        self.require_visible(account, space, file_system_id).await?;
        account
            .clients
            .control_plane
            .get_file_system(file_system_id)
            .await
            .context(&format!("describe filesystem {file_system_id}"))
    }
}
