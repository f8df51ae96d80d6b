//! In-memory collaborators shared across unit and integration tests.
//!
//! [`FakeCloud`] bundles a control plane, an identity provider, and a subnet
//! directory that share one call journal, so tests can assert on the order
//! of provider calls across both clients. Resources start in the `creating`
//! state and become available the next time they are described.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::env;
use std::ffi::OsString;
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::accounts::{Account, AccountClients, AccountDefaults};
use crate::error::ProviderError;
use crate::lifecycle::{BackupPolicy, LifecycleConfiguration};
use crate::provider::{
    AccessKey, AccessKeyMetadata, AccessPoint, AccessPointSpec, ControlPlane, FileSystem,
    FileSystemSpec, IdentityProvider, IdentityUser, LifecycleState, ManagedPolicy, MountEndpoint,
    MountEndpointSpec, ProviderFuture, RESOURCE_TYPE_FILE_SYSTEM, SizeSnapshot, SubnetDirectory,
    TagFilter, TaggedResource,
};
use crate::tags::{NAME_TAG, Tag, tag_value};

/// Account number used by the fakes.
pub const FAKE_ACCOUNT_NUMBER: &str = "111122223333";

const FAKE_REGION: &str = "us-east-1";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn done<'a, T: Send + 'a>(result: Result<T, ProviderError>) -> ProviderFuture<'a, T> {
    Box::pin(ready(result))
}

/// Ordered record of mutating provider calls, shared between fakes.
#[derive(Clone, Debug, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    fn record(&self, entry: String) {
        lock(&self.entries).push(entry);
    }

    /// Returns every recorded call, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    /// Returns the position of the first entry equal to `entry`.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        lock(&self.entries).iter().position(|candidate| candidate == entry)
    }
}

#[derive(Clone, Debug)]
struct FileSystemRecord {
    descriptor: FileSystem,
    backup_policy: BackupPolicy,
    lifecycle: LifecycleConfiguration,
    access_policy: Option<String>,
}

#[derive(Debug, Default)]
struct ControlPlaneState {
    next_id: u64,
    tokens: HashMap<String, String>,
    file_systems: BTreeMap<String, FileSystemRecord>,
    endpoints: BTreeMap<String, MountEndpoint>,
    access_points: BTreeMap<String, AccessPoint>,
    extra_resources: Vec<TaggedResource>,
    initial_file_system_state: Option<LifecycleState>,
    initial_access_point_state: Option<LifecycleState>,
    failing_subnets: BTreeSet<String>,
    access_point_creates: usize,
    failing_access_point_create: Option<usize>,
    failing_file_system_deletes: u32,
}

impl ControlPlaneState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn record(&mut self, id: &str) -> Result<&mut FileSystemRecord, ProviderError> {
        self.file_systems.get_mut(id).ok_or_else(|| {
            ProviderError::new("FileSystemNotFound", format!("filesystem {id} does not exist"))
        })
    }

    fn refresh_counts(&mut self, id: &str) {
        let endpoints = self
            .endpoints
            .values()
            .filter(|endpoint| endpoint.file_system_id == id)
            .count();
        let access_points = self
            .access_points
            .values()
            .filter(|access_point| access_point.file_system_id == id)
            .count();
        if let Some(record) = self.file_systems.get_mut(id) {
            record.descriptor.number_of_mount_targets = u32::try_from(endpoints).unwrap_or(u32::MAX);
            record.descriptor.number_of_access_points =
                u32::try_from(access_points).unwrap_or(u32::MAX);
        }
    }
}

fn advance(state: &mut LifecycleState) {
    if *state == LifecycleState::Creating {
        *state = LifecycleState::Available;
    }
}

fn file_system_arn(id: &str) -> String {
    format!("arn:aws:elasticfilesystem:{FAKE_REGION}:{FAKE_ACCOUNT_NUMBER}:file-system/{id}")
}

fn matches_filters(tags: &[Tag], filters: &[TagFilter]) -> bool {
    filters.iter().all(|filter| {
        tag_value(tags, &filter.key).is_some_and(|value| filter.values.iter().any(|v| v == value))
    })
}

/// In-memory [`ControlPlane`].
#[derive(Clone, Debug, Default)]
pub struct FakeControlPlane {
    state: Arc<Mutex<ControlPlaneState>>,
    journal: CallJournal,
}

impl FakeControlPlane {
    /// Creates a control plane recording into `journal`.
    #[must_use]
    pub fn with_journal(journal: CallJournal) -> Self {
        Self {
            state: Arc::default(),
            journal,
        }
    }

    fn state(&self) -> MutexGuard<'_, ControlPlaneState> {
        lock(&self.state)
    }

    /// Adds an arbitrary entry to the tag index.
    pub fn insert_tagged_resource(&self, arn: &str, tags: Vec<Tag>) {
        self.state().extra_resources.push(TaggedResource {
            arn: arn.to_owned(),
            tags,
        });
    }

    /// Filesystems created from now on start in `state` instead of
    /// `creating`.
    pub fn start_file_systems_in(&self, state: LifecycleState) {
        self.state().initial_file_system_state = Some(state);
    }

    /// Access points created from now on start in `state` instead of
    /// `creating`.
    pub fn start_access_points_in(&self, state: LifecycleState) {
        self.state().initial_access_point_state = Some(state);
    }

    /// Overrides the state of an existing filesystem.
    pub fn set_file_system_state(&self, id: &str, lifecycle_state: LifecycleState) {
        if let Some(record) = self.state().file_systems.get_mut(id) {
            record.descriptor.lifecycle_state = lifecycle_state;
        }
    }

    /// Overrides the state of an existing mount endpoint.
    pub fn set_mount_endpoint_state(&self, id: &str, lifecycle_state: LifecycleState) {
        if let Some(endpoint) = self.state().endpoints.get_mut(id) {
            endpoint.lifecycle_state = lifecycle_state;
        }
    }

    /// Makes mount endpoint creation fail in `subnet`.
    pub fn fail_mount_endpoints_in(&self, subnet: &str) {
        self.state().failing_subnets.insert(subnet.to_owned());
    }

    /// Makes the `call`-th access point create call (1-based) fail.
    pub fn fail_access_point_create(&self, call: usize) {
        self.state().failing_access_point_create = Some(call);
    }

    /// Makes the next `count` filesystem deletes fail as still in use.
    pub fn fail_file_system_deletes(&self, count: u32) {
        self.state().failing_file_system_deletes = count;
    }

    /// Returns a filesystem without advancing its state.
    #[must_use]
    pub fn file_system(&self, id: &str) -> Option<FileSystem> {
        self.state()
            .file_systems
            .get(id)
            .map(|record| record.descriptor.clone())
    }

    /// Returns every filesystem.
    #[must_use]
    pub fn file_systems(&self) -> Vec<FileSystem> {
        self.state()
            .file_systems
            .values()
            .map(|record| record.descriptor.clone())
            .collect()
    }

    /// Returns the mount endpoints of a filesystem.
    #[must_use]
    pub fn mount_endpoints(&self, file_system_id: &str) -> Vec<MountEndpoint> {
        self.state()
            .endpoints
            .values()
            .filter(|endpoint| endpoint.file_system_id == file_system_id)
            .cloned()
            .collect()
    }

    /// Returns the access points of a filesystem.
    #[must_use]
    pub fn access_points(&self, file_system_id: &str) -> Vec<AccessPoint> {
        self.state()
            .access_points
            .values()
            .filter(|access_point| access_point.file_system_id == file_system_id)
            .cloned()
            .collect()
    }

    /// Returns the stored access policy document of a filesystem.
    #[must_use]
    pub fn access_policy(&self, file_system_id: &str) -> Option<String> {
        self.state()
            .file_systems
            .get(file_system_id)
            .and_then(|record| record.access_policy.clone())
    }

    /// Returns the shared call journal.
    #[must_use]
    pub fn journal(&self) -> CallJournal {
        self.journal.clone()
    }
}

impl ControlPlane for FakeControlPlane {
    fn create_file_system<'a>(
        &'a self,
        spec: &'a FileSystemSpec,
        token: &'a str,
    ) -> ProviderFuture<'a, FileSystem> {
        let mut state = self.state();
        if let Some(id) = state.tokens.get(token).cloned() {
            return done(state.record(&id).map(|record| record.descriptor.clone()));
        }
        let id = state.next("fs");
        let descriptor = FileSystem {
            id: id.clone(),
            arn: file_system_arn(&id),
            name: tag_value(&spec.tags, NAME_TAG).unwrap_or_default().to_owned(),
            lifecycle_state: state
                .initial_file_system_state
                .unwrap_or(LifecycleState::Creating),
            kms_key_id: spec.kms_key_id.clone(),
            availability_zone: spec.availability_zone.clone(),
            number_of_mount_targets: 0,
            number_of_access_points: 0,
            size: SizeSnapshot::default(),
            tags: spec.tags.clone(),
        };
        state.tokens.insert(token.to_owned(), id.clone());
        state.file_systems.insert(
            id.clone(),
            FileSystemRecord {
                descriptor: descriptor.clone(),
                backup_policy: BackupPolicy::Disabled,
                lifecycle: LifecycleConfiguration::default(),
                access_policy: None,
            },
        );
        self.journal.record(format!("create_file_system {id}"));
        done(Ok(descriptor))
    }

    fn get_file_system<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, FileSystem> {
        let mut state = self.state();
        state.refresh_counts(id);
        done(state.record(id).map(|record| {
            let snapshot = record.descriptor.clone();
            advance(&mut record.descriptor.lifecycle_state);
            snapshot
        }))
    }

    fn delete_file_system<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal.record(format!("delete_file_system {id}"));
        if state.failing_file_system_deletes > 0 {
            state.failing_file_system_deletes -= 1;
            return done(Err(ProviderError::new(
                "FileSystemInUse",
                format!("filesystem {id} is busy"),
            )));
        }
        if state.endpoints.values().any(|endpoint| endpoint.file_system_id == id) {
            return done(Err(ProviderError::new(
                "FileSystemInUse",
                format!("filesystem {id} still has mount targets"),
            )));
        }
        let result = state.file_systems.remove(id).map(|_| ()).ok_or_else(|| {
            ProviderError::new("FileSystemNotFound", format!("filesystem {id} does not exist"))
        });
        done(result)
    }

    fn list_tagged_resources<'a>(
        &'a self,
        resource_type: &'a str,
        filters: &'a [TagFilter],
    ) -> ProviderFuture<'a, Vec<TaggedResource>> {
        let state = self.state();
        let mut resources = Vec::new();
        if resource_type == RESOURCE_TYPE_FILE_SYSTEM {
            resources.extend(state.file_systems.values().map(|record| TaggedResource {
                arn: record.descriptor.arn.clone(),
                tags: record.descriptor.tags.clone(),
            }));
        }
        resources.extend(state.extra_resources.iter().cloned());
        resources.retain(|resource| matches_filters(&resource.tags, filters));
        done(Ok(resources))
    }

    fn create_mount_endpoint<'a>(
        &'a self,
        spec: &'a MountEndpointSpec,
    ) -> ProviderFuture<'a, MountEndpoint> {
        let mut state = self.state();
        if let Err(err) = state.record(&spec.file_system_id) {
            return done(Err(err));
        }
        if state.failing_subnets.contains(&spec.subnet_id) {
            return done(Err(ProviderError::new(
                "SubnetNotFound",
                format!("subnet {} does not exist", spec.subnet_id),
            )));
        }
        let id = state.next("fsmt");
        let endpoint = MountEndpoint {
            id: id.clone(),
            file_system_id: spec.file_system_id.clone(),
            lifecycle_state: LifecycleState::Creating,
            subnet_id: spec.subnet_id.clone(),
            availability_zone: None,
            ip_address: Some(format!("10.0.0.{}", state.next_id)),
            security_groups: spec.security_groups.clone(),
        };
        state.endpoints.insert(id.clone(), endpoint.clone());
        self.journal.record(format!("create_mount_endpoint {id}"));
        done(Ok(endpoint))
    }

    fn list_mount_endpoints<'a>(
        &'a self,
        file_system_id: &'a str,
    ) -> ProviderFuture<'a, Vec<MountEndpoint>> {
        let mut state = self.state();
        let endpoints = state
            .endpoints
            .values_mut()
            .filter(|endpoint| endpoint.file_system_id == file_system_id)
            .map(|endpoint| {
                let snapshot = endpoint.clone();
                advance(&mut endpoint.lifecycle_state);
                snapshot
            })
            .collect();
        done(Ok(endpoints))
    }

    fn delete_mount_endpoint<'a>(&'a self, endpoint_id: &'a str) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal.record(format!("delete_mount_endpoint {endpoint_id}"));
        let result = state.endpoints.remove(endpoint_id).map(|_| ()).ok_or_else(|| {
            ProviderError::new(
                "MountTargetNotFound",
                format!("mount target {endpoint_id} does not exist"),
            )
        });
        done(result)
    }

    fn create_access_point<'a>(
        &'a self,
        spec: &'a AccessPointSpec,
        token: &'a str,
    ) -> ProviderFuture<'a, AccessPoint> {
        let mut state = self.state();
        if let Some(access_point) = state
            .tokens
            .get(token)
            .and_then(|id| state.access_points.get(id))
        {
            return done(Ok(access_point.clone()));
        }
        if let Err(err) = state.record(&spec.file_system_id) {
            return done(Err(err));
        }
        state.access_point_creates += 1;
        if state.failing_access_point_create == Some(state.access_point_creates) {
            return done(Err(ProviderError::new(
                "AccessPointLimitExceeded",
                "too many access points",
            )));
        }
        let id = state.next("fsap");
        let access_point = AccessPoint {
            id: id.clone(),
            arn: format!(
                "arn:aws:elasticfilesystem:{FAKE_REGION}:{FAKE_ACCOUNT_NUMBER}:access-point/{id}"
            ),
            file_system_id: spec.file_system_id.clone(),
            name: tag_value(&spec.tags, NAME_TAG).unwrap_or_default().to_owned(),
            lifecycle_state: state
                .initial_access_point_state
                .unwrap_or(LifecycleState::Creating),
            posix_user: spec.posix_user.clone(),
            root_directory: spec.root_directory.clone(),
            tags: spec.tags.clone(),
        };
        state.tokens.insert(token.to_owned(), id.clone());
        state.access_points.insert(id.clone(), access_point.clone());
        self.journal.record(format!("create_access_point {id}"));
        done(Ok(access_point))
    }

    fn list_access_points<'a>(
        &'a self,
        file_system_id: &'a str,
    ) -> ProviderFuture<'a, Vec<AccessPoint>> {
        done(Ok(self.access_points(file_system_id)))
    }

    fn get_access_point<'a>(&'a self, access_point_id: &'a str) -> ProviderFuture<'a, AccessPoint> {
        let mut state = self.state();
        let result = state
            .access_points
            .get_mut(access_point_id)
            .map(|access_point| {
                let snapshot = access_point.clone();
                advance(&mut access_point.lifecycle_state);
                snapshot
            })
            .ok_or_else(|| {
                ProviderError::new(
                    "AccessPointNotFound",
                    format!("access point {access_point_id} does not exist"),
                )
            });
        done(result)
    }

    fn delete_access_point<'a>(&'a self, access_point_id: &'a str) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal.record(format!("delete_access_point {access_point_id}"));
        let result = state
            .access_points
            .remove(access_point_id)
            .map(|_| ())
            .ok_or_else(|| {
                ProviderError::new(
                    "AccessPointNotFound",
                    format!("access point {access_point_id} does not exist"),
                )
            });
        done(result)
    }

    fn set_backup_policy<'a>(
        &'a self,
        file_system_id: &'a str,
        policy: BackupPolicy,
    ) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal
            .record(format!("set_backup_policy {file_system_id} {policy}"));
        done(state.record(file_system_id).map(|record| record.backup_policy = policy))
    }

    fn get_backup_policy<'a>(&'a self, file_system_id: &'a str) -> ProviderFuture<'a, BackupPolicy> {
        let mut state = self.state();
        done(state.record(file_system_id).map(|record| record.backup_policy))
    }

    fn set_lifecycle<'a>(
        &'a self,
        file_system_id: &'a str,
        configuration: LifecycleConfiguration,
    ) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal.record(format!(
            "set_lifecycle {file_system_id} {} {}",
            configuration.transition_to_ia, configuration.transition_to_primary
        ));
        done(state.record(file_system_id).map(|record| record.lifecycle = configuration))
    }

    fn get_lifecycle<'a>(
        &'a self,
        file_system_id: &'a str,
    ) -> ProviderFuture<'a, LifecycleConfiguration> {
        let mut state = self.state();
        done(state.record(file_system_id).map(|record| record.lifecycle))
    }

    fn set_access_policy<'a>(
        &'a self,
        file_system_id: &'a str,
        document: &'a str,
    ) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal
            .record(format!("set_access_policy {file_system_id}"));
        done(
            state
                .record(file_system_id)
                .map(|record| record.access_policy = Some(document.to_owned())),
        )
    }

    fn get_access_policy<'a>(
        &'a self,
        file_system_id: &'a str,
    ) -> ProviderFuture<'a, Option<String>> {
        let mut state = self.state();
        done(
            state
                .record(file_system_id)
                .map(|record| record.access_policy.clone()),
        )
    }

    fn delete_access_policy<'a>(&'a self, file_system_id: &'a str) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal
            .record(format!("delete_access_policy {file_system_id}"));
        done(state.record(file_system_id).map(|record| record.access_policy = None))
    }

    fn tag_resource<'a>(
        &'a self,
        file_system_id: &'a str,
        tags: &'a [Tag],
    ) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal.record(format!("tag_resource {file_system_id}"));
        done(state.record(file_system_id).map(|record| {
            let existing = &mut record.descriptor.tags;
            for tag in tags {
                existing.retain(|current| current.key != tag.key);
                existing.push(tag.clone());
            }
        }))
    }
}

#[derive(Debug, Default)]
struct IdentityState {
    next_key: u64,
    users: BTreeMap<String, IdentityUser>,
    keys: BTreeMap<String, Vec<AccessKeyMetadata>>,
    memberships: BTreeMap<String, BTreeSet<String>>,
    groups: BTreeMap<String, String>,
    policies: BTreeMap<String, ManagedPolicy>,
    attachments: BTreeMap<String, Vec<String>>,
    failing_user_deletes: BTreeSet<String>,
}

fn no_such_entity(what: &str) -> ProviderError {
    ProviderError::new("NoSuchEntity", format!("{what} cannot be found"))
}

/// In-memory [`IdentityProvider`].
#[derive(Clone, Debug, Default)]
pub struct FakeIdentity {
    state: Arc<Mutex<IdentityState>>,
    journal: CallJournal,
}

impl FakeIdentity {
    /// Creates an identity provider recording into `journal`.
    #[must_use]
    pub fn with_journal(journal: CallJournal) -> Self {
        Self {
            state: Arc::default(),
            journal,
        }
    }

    fn state(&self) -> MutexGuard<'_, IdentityState> {
        lock(&self.state)
    }

    /// Makes deleting the user with this full name fail.
    pub fn fail_user_delete(&self, user_name: &str) {
        self.state()
            .failing_user_deletes
            .insert(user_name.to_owned());
    }

    /// Returns every user.
    #[must_use]
    pub fn users(&self) -> Vec<IdentityUser> {
        self.state().users.values().cloned().collect()
    }

    /// Returns the groups a user belongs to.
    #[must_use]
    pub fn groups_of(&self, user_name: &str) -> Vec<String> {
        self.state()
            .memberships
            .get(user_name)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the managed policy with `name`.
    #[must_use]
    pub fn policy(&self, name: &str) -> Option<ManagedPolicy> {
        self.state().policies.get(name).cloned()
    }

    /// Returns the policy ARNs attached to a group.
    #[must_use]
    pub fn attached_policies(&self, group: &str) -> Vec<String> {
        self.state()
            .attachments
            .get(group)
            .cloned()
            .unwrap_or_default()
    }
}

impl IdentityProvider for FakeIdentity {
    fn create_user<'a>(
        &'a self,
        name: &'a str,
        path: &'a str,
        tags: &'a [Tag],
    ) -> ProviderFuture<'a, IdentityUser> {
        let mut state = self.state();
        if state.users.contains_key(name) {
            return done(Err(ProviderError::new(
                "EntityAlreadyExists",
                format!("user {name} already exists"),
            )));
        }
        let user = IdentityUser {
            name: name.to_owned(),
            path: path.to_owned(),
            arn: format!("arn:aws:iam::{FAKE_ACCOUNT_NUMBER}:user{path}{name}"),
            tags: tags.to_vec(),
        };
        state.users.insert(name.to_owned(), user.clone());
        self.journal.record(format!("create_user {name}"));
        done(Ok(user))
    }

    fn get_user<'a>(&'a self, name: &'a str, path: &'a str) -> ProviderFuture<'a, IdentityUser> {
        let state = self.state();
        let result = state
            .users
            .get(name)
            .filter(|user| user.path == path)
            .cloned()
            .ok_or_else(|| no_such_entity(&format!("user {name}")));
        done(result)
    }

    fn delete_user<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal.record(format!("delete_user {name}"));
        if state.failing_user_deletes.contains(name) {
            return done(Err(ProviderError::new(
                "ServiceFailure",
                format!("user {name} could not be deleted"),
            )));
        }
        let attached = state.keys.get(name).is_some_and(|keys| !keys.is_empty())
            || state
                .memberships
                .get(name)
                .is_some_and(|groups| !groups.is_empty());
        if attached {
            return done(Err(ProviderError::new(
                "DeleteConflict",
                format!("user {name} still has keys or group memberships"),
            )));
        }
        let result = state
            .users
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| no_such_entity(&format!("user {name}")));
        done(result)
    }

    fn list_users<'a>(&'a self, path_prefix: &'a str) -> ProviderFuture<'a, Vec<IdentityUser>> {
        let users = self
            .state()
            .users
            .values()
            .filter(|user| user.path.starts_with(path_prefix))
            .cloned()
            .collect();
        done(Ok(users))
    }

    fn tag_user<'a>(&'a self, name: &'a str, tags: &'a [Tag]) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal.record(format!("tag_user {name}"));
        let result = state
            .users
            .get_mut(name)
            .map(|user| {
                for tag in tags {
                    user.tags.retain(|current| current.key != tag.key);
                    user.tags.push(tag.clone());
                }
            })
            .ok_or_else(|| no_such_entity(&format!("user {name}")));
        done(result)
    }

    fn create_access_key<'a>(&'a self, user_name: &'a str) -> ProviderFuture<'a, AccessKey> {
        let mut state = self.state();
        if !state.users.contains_key(user_name) {
            return done(Err(no_such_entity(&format!("user {user_name}"))));
        }
        state.next_key += 1;
        let key = AccessKey {
            access_key_id: format!("AKIA{:012}", state.next_key),
            secret_access_key: format!("secret-{:06}", state.next_key),
            user_name: user_name.to_owned(),
            status: String::from("Active"),
        };
        state
            .keys
            .entry(user_name.to_owned())
            .or_default()
            .push(AccessKeyMetadata {
                access_key_id: key.access_key_id.clone(),
                user_name: user_name.to_owned(),
                status: key.status.clone(),
            });
        self.journal
            .record(format!("create_access_key {user_name}"));
        done(Ok(key))
    }

    fn list_access_keys<'a>(
        &'a self,
        user_name: &'a str,
    ) -> ProviderFuture<'a, Vec<AccessKeyMetadata>> {
        let keys = self.state().keys.get(user_name).cloned().unwrap_or_default();
        done(Ok(keys))
    }

    fn delete_access_key<'a>(
        &'a self,
        user_name: &'a str,
        access_key_id: &'a str,
    ) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal
            .record(format!("delete_access_key {user_name} {access_key_id}"));
        if let Some(keys) = state.keys.get_mut(user_name) {
            keys.retain(|key| key.access_key_id != access_key_id);
        }
        done(Ok(()))
    }

    fn add_user_to_group<'a>(
        &'a self,
        user_name: &'a str,
        group: &'a str,
    ) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        if !state.groups.contains_key(group) {
            return done(Err(no_such_entity(&format!("group {group}"))));
        }
        state
            .memberships
            .entry(user_name.to_owned())
            .or_default()
            .insert(group.to_owned());
        done(Ok(()))
    }

    fn remove_user_from_group<'a>(
        &'a self,
        user_name: &'a str,
        group: &'a str,
    ) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        if let Some(groups) = state.memberships.get_mut(user_name) {
            groups.remove(group);
        }
        done(Ok(()))
    }

    fn list_groups_for_user<'a>(&'a self, user_name: &'a str) -> ProviderFuture<'a, Vec<String>> {
        done(Ok(self.groups_of(user_name)))
    }

    fn create_policy<'a>(
        &'a self,
        name: &'a str,
        path: &'a str,
        document: &'a str,
    ) -> ProviderFuture<'a, ManagedPolicy> {
        let mut state = self.state();
        let policy = ManagedPolicy {
            name: name.to_owned(),
            path: path.to_owned(),
            arn: format!("arn:aws:iam::{FAKE_ACCOUNT_NUMBER}:policy{path}{name}"),
            document: document.to_owned(),
        };
        state.policies.insert(name.to_owned(), policy.clone());
        self.journal.record(format!("create_policy {name}"));
        done(Ok(policy))
    }

    fn get_policy<'a>(&'a self, name: &'a str, path: &'a str) -> ProviderFuture<'a, ManagedPolicy> {
        let result = self
            .state()
            .policies
            .get(name)
            .filter(|policy| policy.path == path)
            .cloned()
            .ok_or_else(|| no_such_entity(&format!("policy {name}")));
        done(result)
    }

    fn update_policy<'a>(&'a self, arn: &'a str, document: &'a str) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal.record(format!("update_policy {arn}"));
        let result = state
            .policies
            .values_mut()
            .find(|policy| policy.arn == arn)
            .map(|policy| policy.document = document.to_owned())
            .ok_or_else(|| no_such_entity(&format!("policy {arn}")));
        done(result)
    }

    fn get_group<'a>(&'a self, name: &'a str, path: &'a str) -> ProviderFuture<'a, ()> {
        let found = self
            .state()
            .groups
            .get(name)
            .is_some_and(|group_path| group_path == path);
        if found {
            return done(Ok(()));
        }
        done(Err(no_such_entity(&format!("group {name}"))))
    }

    fn create_group<'a>(&'a self, name: &'a str, path: &'a str) -> ProviderFuture<'a, ()> {
        self.state().groups.insert(name.to_owned(), path.to_owned());
        self.journal.record(format!("create_group {name}"));
        done(Ok(()))
    }

    fn list_attached_group_policies<'a>(
        &'a self,
        group: &'a str,
    ) -> ProviderFuture<'a, Vec<String>> {
        done(Ok(self.attached_policies(group)))
    }

    fn attach_group_policy<'a>(
        &'a self,
        group: &'a str,
        policy_arn: &'a str,
    ) -> ProviderFuture<'a, ()> {
        let mut state = self.state();
        self.journal
            .record(format!("attach_group_policy {group} {policy_arn}"));
        state
            .attachments
            .entry(group.to_owned())
            .or_default()
            .push(policy_arn.to_owned());
        done(Ok(()))
    }
}

/// In-memory [`SubnetDirectory`].
#[derive(Clone, Debug, Default)]
pub struct FakeSubnets {
    zones: Arc<Mutex<BTreeMap<String, String>>>,
}

impl FakeSubnets {
    /// Registers the zone of a subnet.
    pub fn insert(&self, subnet_id: &str, zone: &str) {
        lock(&self.zones).insert(subnet_id.to_owned(), zone.to_owned());
    }
}

impl SubnetDirectory for FakeSubnets {
    fn subnet_zone<'a>(&'a self, subnet_id: &'a str) -> ProviderFuture<'a, String> {
        let result = lock(&self.zones).get(subnet_id).cloned().ok_or_else(|| {
            ProviderError::new("SubnetNotFound", format!("subnet {subnet_id} does not exist"))
        });
        done(result)
    }
}

/// Fake collaborators of one account sharing a call journal.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    /// Control plane double.
    pub control_plane: FakeControlPlane,
    /// Identity double.
    pub identity: FakeIdentity,
    /// Subnet directory double.
    pub subnets: FakeSubnets,
    /// Journal shared by the control plane and identity doubles.
    pub journal: CallJournal,
}

impl FakeCloud {
    /// Creates an empty cloud with subnets `subnet-a` and `subnet-b` in two
    /// zones.
    #[must_use]
    pub fn new() -> Self {
        let journal = CallJournal::default();
        let subnets = FakeSubnets::default();
        subnets.insert("subnet-a", "us-east-1a");
        subnets.insert("subnet-b", "us-east-1b");
        Self {
            control_plane: FakeControlPlane::with_journal(journal.clone()),
            identity: FakeIdentity::with_journal(journal.clone()),
            subnets,
            journal,
        }
    }

    /// Returns trait-object clients backed by this cloud.
    #[must_use]
    pub fn clients(&self) -> AccountClients {
        AccountClients {
            control_plane: Arc::new(self.control_plane.clone()),
            identity: Arc::new(self.identity.clone()),
            subnets: Arc::new(self.subnets.clone()),
        }
    }

    /// Returns an account bound to this cloud with both subnets, one
    /// security group, and a KMS key as defaults.
    #[must_use]
    pub fn account(&self, alias: &str) -> Account {
        Account {
            alias: alias.to_owned(),
            number: FAKE_ACCOUNT_NUMBER.to_owned(),
            defaults: AccountDefaults {
                default_subnets: vec![String::from("subnet-a"), String::from("subnet-b")],
                default_security_groups: vec![String::from("sg-default")],
                default_kms_key_id: String::from("kms-default"),
            },
            clients: self.clients(),
        }
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets environment variables while holding a global mutex. Pairs with
    /// an empty value remove the variable instead.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                if value.is_empty() {
                    env::remove_var(key);
                } else {
                    env::set_var(key, value);
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
