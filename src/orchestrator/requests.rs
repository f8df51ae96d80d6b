//! Request and response shapes of the orchestrator operations.
//!
//! Enumerated settings arrive as raw strings and are validated by the
//! operation, so an unknown value is rejected with a bad request before any
//! provider call.

use serde::{Deserialize, Serialize};

use crate::lifecycle::{BackupPolicy, TransitionToIa, TransitionToPrimary};
use crate::policy::AccessPolicyFlags;
use crate::provider::{
    AccessKey, AccessKeyMetadata, AccessPoint, FileSystem, MountEndpoint, PosixIdentity,
    RootDirectory,
};
use crate::tags::Tag;
use crate::task::{TaskHandle, TaskId};

/// Access point to create, standalone or embedded in a filesystem create.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct AccessPointCreateRequest {
    /// Display name; a generated identifier is used when empty.
    pub name: String,
    /// POSIX identity to enforce.
    pub posix_user: Option<PosixIdentity>,
    /// Root directory to expose.
    pub root_directory: Option<RootDirectory>,
}

/// Filesystem to create.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct FileSystemCreateRequest {
    /// Display name. Required.
    pub name: String,
    /// Access points created once the filesystem is mountable.
    pub access_points: Vec<AccessPointCreateRequest>,
    /// `ENABLED` or `DISABLED`; empty means disabled.
    pub backup_policy: String,
    /// Encryption key; empty means the account default.
    pub kms_key_id: String,
    /// Transition rule to infrequent access; empty means `NONE`.
    pub lifecycle_configuration: String,
    /// Transition rule back to primary storage; empty means `NONE`.
    pub transition_to_primary_storage_class: String,
    /// Place the filesystem in a single availability zone.
    pub one_zone: bool,
    /// Security groups of the mount endpoints; empty means the account default.
    pub security_groups: Vec<String>,
    /// Subnets receiving mount endpoints; empty means the account default.
    pub subnets: Vec<String>,
    /// Client tags; scope tags are always overwritten.
    pub tags: Vec<Tag>,
    /// Resource access policy flags.
    pub access_policy: Option<AccessPolicyFlags>,
}

/// Changes applied to an existing filesystem. Empty or absent fields are
/// left unchanged.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct FileSystemUpdateRequest {
    /// `ENABLED` or `DISABLED`.
    pub backup_policy: String,
    /// Transition rule to infrequent access.
    pub lifecycle_configuration: String,
    /// Transition rule back to primary storage.
    pub transition_to_primary_storage_class: String,
    /// Replacement client tags.
    pub tags: Option<Vec<Tag>>,
    /// Replacement access policy flags; flags yielding no statement clear the
    /// policy.
    pub access_policy: Option<AccessPolicyFlags>,
}

/// User to create for a filesystem.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct UserCreateRequest {
    /// Short user name, without the filesystem prefix. Required.
    pub user_name: String,
}

/// Changes applied to an existing filesystem user.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct UserUpdateRequest {
    /// Issue a new access key and delete the previous ones.
    pub reset_key: bool,
    /// Replacement client tags.
    pub tags: Option<Vec<Tag>>,
}

/// Full description of a filesystem.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileSystemResponse {
    /// Control-plane descriptor.
    pub file_system: FileSystem,
    /// Attached mount endpoints.
    pub mount_targets: Vec<MountEndpoint>,
    /// Defined access points.
    pub access_points: Vec<AccessPoint>,
    /// Automatic backup setting.
    pub backup_policy: BackupPolicy,
    /// Transition rule to infrequent access.
    pub lifecycle_configuration: TransitionToIa,
    /// Transition rule back to primary storage.
    pub transition_to_primary_storage_class: TransitionToPrimary,
    /// Flags recovered from the resource access policy.
    pub access_policy: Option<AccessPolicyFlags>,
}

/// Description of a filesystem user.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct UserResponse {
    /// Short user name, without the filesystem prefix.
    pub user_name: String,
    /// Fully qualified resource name, when known.
    pub arn: String,
    /// Tags on the user.
    pub tags: Vec<Tag>,
    /// Existing access keys.
    pub access_keys: Vec<AccessKeyMetadata>,
    /// Key issued by a rotation, including its secret.
    pub access_key: Option<AccessKey>,
    /// Keys deleted by a rotation.
    pub deleted_access_keys: Vec<String>,
}

/// Synchronous result of an accepted mutating operation.
#[derive(Debug)]
pub struct Accepted<T> {
    /// Representation available before the workflow finished.
    pub body: T,
    /// Handle of the task tracking the workflow.
    pub task: TaskHandle,
}

impl<T> Accepted<T> {
    /// Identifier of the tracking task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task.id()
    }
}
