//! Identity-management interface used for filesystem users.

use serde::{Deserialize, Serialize};

use super::ProviderFuture;
use crate::tags::Tag;

/// Identity principal.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IdentityUser {
    /// Full user name.
    pub name: String,
    /// Path the user lives under.
    pub path: String,
    /// Fully qualified resource name.
    pub arn: String,
    /// Tags on the user.
    pub tags: Vec<Tag>,
}

/// Access key without its secret.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccessKeyMetadata {
    /// Key identifier.
    pub access_key_id: String,
    /// Owner of the key.
    pub user_name: String,
    /// Provider status, for example `Active`.
    pub status: String,
}

/// Newly issued access key including its secret.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccessKey {
    /// Key identifier.
    pub access_key_id: String,
    /// Secret, only ever returned at creation time.
    pub secret_access_key: String,
    /// Owner of the key.
    pub user_name: String,
    /// Provider status, for example `Active`.
    pub status: String,
}

/// Managed identity policy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagedPolicy {
    /// Policy name.
    pub name: String,
    /// Path the policy lives under.
    pub path: String,
    /// Fully qualified resource name.
    pub arn: String,
    /// Current default document as JSON.
    pub document: String,
}

/// Identity-management client for one account.
pub trait IdentityProvider: Send + Sync {
    /// Creates a user under `path`.
    fn create_user<'a>(
        &'a self,
        name: &'a str,
        path: &'a str,
        tags: &'a [Tag],
    ) -> ProviderFuture<'a, IdentityUser>;

    /// Returns the user, failing with a not-found code unless it lives under
    /// `path`.
    fn get_user<'a>(&'a self, name: &'a str, path: &'a str) -> ProviderFuture<'a, IdentityUser>;

    /// Deletes a user. Keys and group memberships must be removed first.
    fn delete_user<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()>;

    /// Lists users whose path starts with `path_prefix`.
    fn list_users<'a>(&'a self, path_prefix: &'a str) -> ProviderFuture<'a, Vec<IdentityUser>>;

    /// Adds or overwrites tags on a user.
    fn tag_user<'a>(&'a self, name: &'a str, tags: &'a [Tag]) -> ProviderFuture<'a, ()>;

    /// Issues a new access key.
    fn create_access_key<'a>(&'a self, user_name: &'a str) -> ProviderFuture<'a, AccessKey>;

    /// Lists a user's access keys.
    fn list_access_keys<'a>(
        &'a self,
        user_name: &'a str,
    ) -> ProviderFuture<'a, Vec<AccessKeyMetadata>>;

    /// Deletes an access key.
    fn delete_access_key<'a>(
        &'a self,
        user_name: &'a str,
        access_key_id: &'a str,
    ) -> ProviderFuture<'a, ()>;

    /// Adds a user to a group.
    fn add_user_to_group<'a>(&'a self, user_name: &'a str, group: &'a str)
    -> ProviderFuture<'a, ()>;

    /// Removes a user from a group.
    fn remove_user_from_group<'a>(
        &'a self,
        user_name: &'a str,
        group: &'a str,
    ) -> ProviderFuture<'a, ()>;

    /// Lists the names of the groups a user belongs to.
    fn list_groups_for_user<'a>(&'a self, user_name: &'a str) -> ProviderFuture<'a, Vec<String>>;

    /// Creates a managed policy.
    fn create_policy<'a>(
        &'a self,
        name: &'a str,
        path: &'a str,
        document: &'a str,
    ) -> ProviderFuture<'a, ManagedPolicy>;

    /// Returns a managed policy, failing with a not-found code when missing.
    fn get_policy<'a>(&'a self, name: &'a str, path: &'a str) -> ProviderFuture<'a, ManagedPolicy>;

    /// Replaces the default document of a managed policy.
    fn update_policy<'a>(&'a self, arn: &'a str, document: &'a str) -> ProviderFuture<'a, ()>;

    /// Returns `Ok(())` when the group exists under `path`, failing with a
    /// not-found code otherwise.
    fn get_group<'a>(&'a self, name: &'a str, path: &'a str) -> ProviderFuture<'a, ()>;

    /// Creates a group.
    fn create_group<'a>(&'a self, name: &'a str, path: &'a str) -> ProviderFuture<'a, ()>;

    /// Lists the ARNs of policies attached to a group.
    fn list_attached_group_policies<'a>(
        &'a self,
        group: &'a str,
    ) -> ProviderFuture<'a, Vec<String>>;

    /// Attaches a managed policy to a group.
    fn attach_group_policy<'a>(
        &'a self,
        group: &'a str,
        policy_arn: &'a str,
    ) -> ProviderFuture<'a, ()>;
}
