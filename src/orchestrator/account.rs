//! Per-org admin policy and group that filesystem users join.

use tracing::{debug, info};

use super::Orchestrator;
use crate::error::{ProviderResultExt, ProvisionError};
use crate::policy::{PolicyDocument, admin_policy};
use crate::provider::IdentityProvider;

/// Change made to the admin policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PolicyAction {
    /// The stored document already matched.
    #[default]
    Unchanged,
    /// The policy did not exist and was created.
    Created,
    /// The stored document differed and was replaced.
    Updated,
}

/// What [`Orchestrator::prepare_account`] had to change.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AccountPreparation {
    /// Resource name of the admin policy.
    pub policy_arn: String,
    /// Change made to the admin policy.
    pub policy: PolicyAction,
    /// The group did not exist and was created.
    pub group_created: bool,
    /// The policy was not attached to the group and has been attached.
    pub policy_attached: bool,
}

impl AccountPreparation {
    /// Returns `true` when anything was created, updated, or attached.
    #[must_use]
    pub const fn changed(&self) -> bool {
        !matches!(self.policy, PolicyAction::Unchanged) || self.group_created || self.policy_attached
    }
}

impl Orchestrator {
    /// Ensures the org's admin policy and group exist in an account and that
    /// the policy is attached to the group. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns not found for unknown accounts or the classified provider
    /// error of a failed identity call.
    pub async fn prepare_account(&self, account: &str) -> Result<AccountPreparation, ProvisionError> {
        let identity = self.account(account)?.clients.identity.as_ref();
        let path = self.settings.org_path();
        let policy_name = self.settings.admin_policy_name();
        let group_name = self.settings.admin_group_name();
        let desired = admin_policy(&self.settings.tag_keys);
        let document = desired.to_json()?;

        let mut preparation = AccountPreparation::default();
        match identity.get_policy(&policy_name, &path).await {
            Ok(existing) => {
                preparation.policy_arn = existing.arn.clone();
                if !same_document(&existing.document, &desired) {
                    identity
                        .update_policy(&existing.arn, &document)
                        .await
                        .context(&format!("update policy {policy_name}"))?;
                    preparation.policy = PolicyAction::Updated;
                }
            }
            Err(err) if err.is_not_found() => {
                let created = identity
                    .create_policy(&policy_name, &path, &document)
                    .await
                    .context(&format!("create policy {policy_name}"))?;
                preparation.policy_arn = created.arn;
                preparation.policy = PolicyAction::Created;
            }
            Err(err) => {
                return Err(ProvisionError::from_provider(
                    &format!("get policy {policy_name}"),
                    &err,
                ));
            }
        }

        preparation.group_created = ensure_group(identity, &group_name, &path).await?;

        let attached = identity
            .list_attached_group_policies(&group_name)
            .await
            .context(&format!("list policies of group {group_name}"))?;
        if !attached.contains(&preparation.policy_arn) {
            identity
                .attach_group_policy(&group_name, &preparation.policy_arn)
                .await
                .context(&format!("attach policy {policy_name} to group {group_name}"))?;
            preparation.policy_attached = true;
        }

        if preparation.changed() {
            info!(account, ?preparation, "prepared account");
        } else {
            debug!(account, "account already prepared");
        }
        Ok(preparation)
    }
}

fn same_document(stored: &str, desired: &PolicyDocument) -> bool {
    PolicyDocument::from_json(stored).is_ok_and(|document| &document == desired)
}

async fn ensure_group(
    identity: &dyn IdentityProvider,
    name: &str,
    path: &str,
) -> Result<bool, ProvisionError> {
    match identity.get_group(name, path).await {
        Ok(()) => Ok(false),
        Err(err) if err.is_not_found() => {
            identity
                .create_group(name, path)
                .await
                .context(&format!("create group {name}"))?;
            Ok(true)
        }
        Err(err) => Err(ProvisionError::from_provider(&format!("get group {name}"), &err)),
    }
}
