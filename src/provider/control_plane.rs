//! Resource control-plane interface and the shapes it exchanges.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ProviderFuture;
use crate::lifecycle::{BackupPolicy, LifecycleConfiguration};
use crate::tags::Tag;

/// Resource type queried in the tag index.
pub const RESOURCE_TYPE_FILE_SYSTEM: &str = "elasticfilesystem";

/// Performance mode requested for every filesystem.
pub const PERFORMANCE_MODE_GENERAL_PURPOSE: &str = "generalPurpose";

/// Provider-reported lifecycle state of a filesystem, endpoint, or access point.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Being created.
    Creating,
    /// Ready for use.
    Available,
    /// Being modified.
    Updating,
    /// Being deleted.
    Deleting,
    /// Gone.
    Deleted,
    /// Provisioning failed on the provider side.
    Error,
}

impl LifecycleState {
    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Parameters of a filesystem create call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileSystemSpec {
    /// Encryption key reference.
    pub kms_key_id: String,
    /// Always `true` for filesystems created by the orchestrator.
    pub encrypted: bool,
    /// Performance mode, see [`PERFORMANCE_MODE_GENERAL_PURPOSE`].
    pub performance_mode: String,
    /// Availability zone for one-zone placement.
    pub availability_zone: Option<String>,
    /// Normalized tags, including the display name.
    pub tags: Vec<Tag>,
}

/// Storage usage reported by the provider.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SizeSnapshot {
    /// Total metered bytes.
    pub value: u64,
    /// Bytes held in the infrequent-access class.
    pub value_in_ia: u64,
    /// Bytes held in the standard class.
    pub value_in_standard: u64,
}

/// Filesystem as described by the control plane.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileSystem {
    /// Provider identifier.
    pub id: String,
    /// Fully qualified resource name.
    pub arn: String,
    /// Display name taken from the `Name` tag.
    pub name: String,
    /// Current lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// Encryption key reference.
    pub kms_key_id: String,
    /// Zone of a one-zone filesystem.
    pub availability_zone: Option<String>,
    /// Number of mount endpoints currently attached.
    pub number_of_mount_targets: u32,
    /// Number of access points currently defined.
    pub number_of_access_points: u32,
    /// Usage snapshot.
    pub size: SizeSnapshot,
    /// Tags on the resource.
    pub tags: Vec<Tag>,
}

/// Parameters of a mount endpoint create call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MountEndpointSpec {
    /// Filesystem the endpoint attaches to.
    pub file_system_id: String,
    /// Subnet receiving the network interface.
    pub subnet_id: String,
    /// Security groups applied to the interface.
    pub security_groups: Vec<String>,
}

/// Network attachment point for a filesystem.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MountEndpoint {
    /// Provider identifier.
    pub id: String,
    /// Owning filesystem.
    pub file_system_id: String,
    /// Current lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// Subnet of the endpoint.
    pub subnet_id: String,
    /// Zone of the subnet, when reported.
    pub availability_zone: Option<String>,
    /// Address of the network interface, when assigned.
    pub ip_address: Option<String>,
    /// Security groups applied to the interface.
    pub security_groups: Vec<String>,
}

/// POSIX identity enforced for requests made through an access point.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PosixIdentity {
    /// User id.
    pub uid: u64,
    /// Primary group id.
    pub gid: u64,
    /// Additional group ids.
    #[serde(default)]
    pub secondary_gids: Vec<u64>,
}

/// Ownership applied when the provider creates an access point's root.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RootDirectoryCreation {
    /// Owner user id.
    pub owner_uid: u64,
    /// Owner group id.
    pub owner_gid: u64,
    /// Octal permission string, for example `0755`.
    pub permissions: String,
}

/// Directory exposed as the root of an access point.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RootDirectory {
    /// Path inside the filesystem.
    pub path: String,
    /// Ownership used if the path does not exist yet.
    #[serde(default)]
    pub creation_info: Option<RootDirectoryCreation>,
}

/// Parameters of an access point create call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessPointSpec {
    /// Parent filesystem.
    pub file_system_id: String,
    /// Enforced POSIX identity.
    pub posix_user: Option<PosixIdentity>,
    /// Root directory.
    pub root_directory: Option<RootDirectory>,
    /// Tags, including the display name.
    pub tags: Vec<Tag>,
}

/// Named view into a filesystem.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccessPoint {
    /// Provider identifier.
    pub id: String,
    /// Fully qualified resource name.
    pub arn: String,
    /// Parent filesystem.
    pub file_system_id: String,
    /// Display name.
    pub name: String,
    /// Current lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// Enforced POSIX identity.
    pub posix_user: Option<PosixIdentity>,
    /// Root directory.
    pub root_directory: Option<RootDirectory>,
    /// Tags.
    pub tags: Vec<Tag>,
}

/// Filter applied to the tag index: the key must carry one of `values`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagFilter {
    /// Tag key.
    pub key: String,
    /// Accepted values.
    pub values: Vec<String>,
}

impl TagFilter {
    /// Builds a single-value filter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: vec![value.into()],
        }
    }
}

/// Entry returned by the tag index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaggedResource {
    /// Fully qualified resource name.
    pub arn: String,
    /// Tags on the resource.
    pub tags: Vec<Tag>,
}

/// Control-plane client for one account.
pub trait ControlPlane: Send + Sync {
    /// Creates a filesystem. Repeating a call with the same token returns the
    /// filesystem created by the first call.
    fn create_file_system<'a>(
        &'a self,
        spec: &'a FileSystemSpec,
        token: &'a str,
    ) -> ProviderFuture<'a, FileSystem>;

    /// Describes a filesystem.
    fn get_file_system<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, FileSystem>;

    /// Deletes a filesystem. Fails while mount endpoints remain.
    fn delete_file_system<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Lists resources of `resource_type` matching every filter.
    fn list_tagged_resources<'a>(
        &'a self,
        resource_type: &'a str,
        filters: &'a [TagFilter],
    ) -> ProviderFuture<'a, Vec<TaggedResource>>;

    /// Creates a mount endpoint.
    fn create_mount_endpoint<'a>(
        &'a self,
        spec: &'a MountEndpointSpec,
    ) -> ProviderFuture<'a, MountEndpoint>;

    /// Lists the mount endpoints of a filesystem.
    fn list_mount_endpoints<'a>(
        &'a self,
        file_system_id: &'a str,
    ) -> ProviderFuture<'a, Vec<MountEndpoint>>;

    /// Deletes a mount endpoint.
    fn delete_mount_endpoint<'a>(&'a self, endpoint_id: &'a str) -> ProviderFuture<'a, ()>;

    /// Creates an access point. Repeating a call with the same token returns
    /// the access point created by the first call.
    fn create_access_point<'a>(
        &'a self,
        spec: &'a AccessPointSpec,
        token: &'a str,
    ) -> ProviderFuture<'a, AccessPoint>;

    /// Lists the access points of a filesystem.
    fn list_access_points<'a>(
        &'a self,
        file_system_id: &'a str,
    ) -> ProviderFuture<'a, Vec<AccessPoint>>;

    /// Describes an access point.
    fn get_access_point<'a>(&'a self, access_point_id: &'a str) -> ProviderFuture<'a, AccessPoint>;

    /// Deletes an access point.
    fn delete_access_point<'a>(&'a self, access_point_id: &'a str) -> ProviderFuture<'a, ()>;

    /// Sets the automatic backup policy.
    fn set_backup_policy<'a>(
        &'a self,
        file_system_id: &'a str,
        policy: BackupPolicy,
    ) -> ProviderFuture<'a, ()>;

    /// Returns the automatic backup policy.
    fn get_backup_policy<'a>(&'a self, file_system_id: &'a str) -> ProviderFuture<'a, BackupPolicy>;

    /// Sets both storage-class transition rules.
    fn set_lifecycle<'a>(
        &'a self,
        file_system_id: &'a str,
        configuration: LifecycleConfiguration,
    ) -> ProviderFuture<'a, ()>;

    /// Returns the storage-class transition rules.
    fn get_lifecycle<'a>(
        &'a self,
        file_system_id: &'a str,
    ) -> ProviderFuture<'a, LifecycleConfiguration>;

    /// Replaces the resource access policy document.
    fn set_access_policy<'a>(
        &'a self,
        file_system_id: &'a str,
        document: &'a str,
    ) -> ProviderFuture<'a, ()>;

    /// Returns the resource access policy document, if one is set.
    fn get_access_policy<'a>(
        &'a self,
        file_system_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>>;

    /// Removes the resource access policy document.
    fn delete_access_policy<'a>(&'a self, file_system_id: &'a str) -> ProviderFuture<'a, ()>;

    /// Adds or overwrites tags on a filesystem.
    fn tag_resource<'a>(
        &'a self,
        file_system_id: &'a str,
        tags: &'a [Tag],
    ) -> ProviderFuture<'a, ()>;
}

/// Network lookup used for one-zone placement.
pub trait SubnetDirectory: Send + Sync {
    /// Returns the availability zone of a subnet.
    fn subnet_zone<'a>(&'a self, subnet_id: &'a str) -> ProviderFuture<'a, String>;
}
