//! Tag normalization for resources, access points, and users.
//!
//! Tenant ownership is expressed entirely through tags, so the org, space,
//! and `Name` tags are always rewritten from server-side context and never
//! trusted from the client.

use serde::{Deserialize, Serialize};

/// Display name tag key.
pub const NAME_TAG: &str = "Name";

/// Tag key linking a user back to the resource it may mount.
pub const RESOURCE_NAME_TAG: &str = "ResourceName";

/// Key prefix reserved by the provider; such tags are never forwarded.
pub const RESERVED_TAG_PREFIX: &str = "aws:";

/// Default namespace for the org and space tag keys.
pub const DEFAULT_TAG_NAMESPACE: &str = "spinup";

/// Key/value tag.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Keys of the tags that scope a resource to its tenant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagKeys {
    /// Key holding the organization identifier.
    pub org: String,
    /// Key holding the space identifier.
    pub space: String,
}

impl TagKeys {
    /// Builds `<namespace>:org` and `<namespace>:spaceid` keys.
    #[must_use]
    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            org: format!("{namespace}:org"),
            space: format!("{namespace}:spaceid"),
        }
    }

    fn is_managed(&self, key: &str) -> bool {
        key == self.org || key == self.space || key == NAME_TAG || key.starts_with(RESERVED_TAG_PREFIX)
    }
}

impl Default for TagKeys {
    fn default() -> Self {
        Self::with_namespace(DEFAULT_TAG_NAMESPACE)
    }
}

/// Returns the value of the first tag with `key`.
#[must_use]
pub fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
}

/// Strips client-supplied name/org/space tags and provider-reserved tags,
/// then appends `Name`, org, and space tags from server-side context.
///
/// The result always holds exactly one of each managed tag, and normalizing
/// an already normalized set yields the same set.
#[must_use]
pub fn normalize_tags(keys: &TagKeys, org: &str, name: &str, space: &str, tags: &[Tag]) -> Vec<Tag> {
    let mut normalized: Vec<Tag> = tags
        .iter()
        .filter(|tag| !keys.is_managed(&tag.key))
        .cloned()
        .collect();
    normalized.push(Tag::new(NAME_TAG, name));
    normalized.push(Tag::new(keys.org.clone(), org));
    normalized.push(Tag::new(keys.space.clone(), space));
    normalized
}

/// Derives access point tags from the parent resource's tags, naming the
/// access point `<resource-name>-<access-point-name>`.
#[must_use]
pub fn access_point_tags(parent_tags: &[Tag], parent_name: &str, access_point_name: &str) -> Vec<Tag> {
    let display_name = format!("{parent_name}-{access_point_name}");
    let mut tags: Vec<Tag> = parent_tags
        .iter()
        .filter(|tag| tag.key != NAME_TAG)
        .cloned()
        .collect();
    tags.push(Tag::new(NAME_TAG, display_name));
    tags
}

/// Builds the tags applied to a filesystem user: the resource tags normalized
/// under the user's full name, plus a [`RESOURCE_NAME_TAG`] naming the
/// resource.
#[must_use]
pub fn user_tags(
    keys: &TagKeys,
    org: &str,
    space: &str,
    user_name: &str,
    resource_name: &str,
    resource_tags: &[Tag],
) -> Vec<Tag> {
    let mut tags: Vec<Tag> = normalize_tags(keys, org, user_name, space, resource_tags)
        .into_iter()
        .filter(|tag| tag.key != RESOURCE_NAME_TAG)
        .collect();
    tags.push(Tag::new(RESOURCE_NAME_TAG, resource_name));
    tags
}
