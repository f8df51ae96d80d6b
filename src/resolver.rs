//! Tenant-scoped existence checks and listings over the provider tag index.
//!
//! Resources are never looked up by identifier alone: a filesystem is only
//! visible to a tenant when it carries the tenant's org tag (and space tag,
//! when one is given). The tag index may lag recent mutations, so a freshly
//! created filesystem can briefly be reported as missing.

use tracing::debug;

use crate::error::{ProviderResultExt, ProvisionError};
use crate::provider::{ControlPlane, RESOURCE_TYPE_FILE_SYSTEM, TagFilter};
use crate::tags::{TagKeys, tag_value};

const FILE_SYSTEM_RESOURCE_PREFIX: &str = "file-system/";

/// Organization and optional space that scope a lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TenantScope {
    /// Organization identifier.
    pub org: String,
    /// Space identifier; `None` lists across every space of the org.
    pub space: Option<String>,
}

impl TenantScope {
    /// Scope covering a single space.
    #[must_use]
    pub fn space(org: impl Into<String>, space: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            space: Some(space.into()),
        }
    }

    /// Scope covering every space of an organization.
    #[must_use]
    pub fn org(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            space: None,
        }
    }
}

/// Lists and checks filesystems visible to a tenant.
pub struct ResourceResolver<'a> {
    control_plane: &'a dyn ControlPlane,
    keys: &'a TagKeys,
}

impl<'a> ResourceResolver<'a> {
    /// Creates a resolver over one account's control plane.
    #[must_use]
    pub const fn new(control_plane: &'a dyn ControlPlane, keys: &'a TagKeys) -> Self {
        Self {
            control_plane,
            keys,
        }
    }

    /// Lists bare filesystem identifiers in `scope`.
    ///
    /// Without a space filter every identifier is prefixed with its own
    /// space tag value, `<space>/<id>`, so listings across spaces stay
    /// unambiguous.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the tag index query fails.
    pub async fn list(&self, scope: &TenantScope) -> Result<Vec<String>, ProvisionError> {
        let mut filters = vec![TagFilter::new(self.keys.org.clone(), scope.org.clone())];
        if let Some(space) = &scope.space {
            filters.push(TagFilter::new(self.keys.space.clone(), space.clone()));
        }

        let resources = self
            .control_plane
            .list_tagged_resources(RESOURCE_TYPE_FILE_SYSTEM, &filters)
            .await
            .context("list tagged filesystems")?;

        let mut identifiers = Vec::with_capacity(resources.len());
        for resource in resources {
            let name = arn_resource(&resource.arn).unwrap_or(&resource.arn);
            let Some(id) = name.strip_prefix(FILE_SYSTEM_RESOURCE_PREFIX) else {
                debug!(arn = %resource.arn, "skipping non-filesystem resource");
                continue;
            };
            let entry = match (&scope.space, tag_value(&resource.tags, &self.keys.space)) {
                (None, Some(space)) => format!("{space}/{id}"),
                _ => id.to_owned(),
            };
            identifiers.push(entry);
        }
        Ok(identifiers)
    }

    /// Returns `true` when `id` is listed in `scope`.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the tag index query fails.
    pub async fn exists(&self, scope: &TenantScope, id: &str) -> Result<bool, ProvisionError> {
        let identifiers = self.list(scope).await?;
        Ok(identifiers.iter().any(|candidate| candidate == id))
    }
}

/// Returns the resource part of an ARN, `arn:partition:service:region:account:resource`.
fn arn_resource(arn: &str) -> Option<&str> {
    let mut parts = arn.splitn(6, ':');
    if parts.next()? != "arn" {
        return None;
    }
    parts.nth(4)
}
