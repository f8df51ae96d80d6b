//! Unit tests for the provisioning workflows against the in-memory cloud.

use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::error::ErrorKind;
use crate::lifecycle::{BackupPolicy, TransitionToIa, TransitionToPrimary};
use crate::policy::AccessPolicyFlags;
use crate::provider::{IdentityProvider, LifecycleState};
use crate::tags::{RESOURCE_NAME_TAG, Tag, tag_value};
use crate::task::{InMemoryTaskStore, TaskStatus, TaskStore};
use crate::test_support::FakeCloud;

const ACCOUNT: &str = "sandbox";
const SPACE: &str = "space-1";

struct Harness {
    cloud: FakeCloud,
    tasks: InMemoryTaskStore,
    orchestrator: Orchestrator,
}

impl Harness {
    async fn finish<T>(&self, accepted: Accepted<T>) -> TaskSnapshot {
        let id = accepted.task_id();
        accepted.task.wait().await.expect("tracker should finish");
        self.tasks.get(id).await.expect("task should exist")
    }

    async fn provision(&self, space: &str, request: FileSystemCreateRequest) -> String {
        let accepted = self
            .orchestrator
            .create_filesystem(ACCOUNT, space, request)
            .await
            .expect("create should be accepted");
        let id = accepted.body.id.clone();
        let snapshot = self.finish(accepted).await;
        assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");
        id
    }

    fn journal_index(&self, entry: &str) -> usize {
        self.cloud
            .journal
            .position(entry)
            .unwrap_or_else(|| panic!("journal lacks {entry:?}: {:?}", self.cloud.journal.entries()))
    }
}

fn fast_timing() -> WorkflowTiming {
    let backoff = Duration::from_millis(1);
    WorkflowTiming {
        await_policy: RetryPolicy::new(10, backoff),
        delete_policy: RetryPolicy::new(3, backoff),
        rollback_timeout: Duration::from_secs(5),
    }
}

fn named(name: &str) -> FileSystemCreateRequest {
    FileSystemCreateRequest {
        name: name.to_owned(),
        ..FileSystemCreateRequest::default()
    }
}

fn access_point(name: &str) -> AccessPointCreateRequest {
    AccessPointCreateRequest {
        name: name.to_owned(),
        ..AccessPointCreateRequest::default()
    }
}

fn user(name: &str) -> UserCreateRequest {
    UserCreateRequest {
        user_name: name.to_owned(),
    }
}

#[fixture]
fn harness() -> Harness {
    let cloud = FakeCloud::new();
    let mut registry = AccountRegistry::new();
    registry.insert(cloud.account(ACCOUNT));
    let tasks = InMemoryTaskStore::new();
    let settings = OrchestratorSettings::new("acme").with_timing(fast_timing());
    let orchestrator = Orchestrator::new(registry, Arc::new(tasks.clone()), settings);
    Harness {
        cloud,
        tasks,
        orchestrator,
    }
}

#[rstest]
#[tokio::test]
async fn create_applies_defaults_and_one_endpoint_per_subnet(harness: Harness) {
    let accepted = harness
        .orchestrator
        .create_filesystem(ACCOUNT, SPACE, named("alpha"))
        .await
        .expect("create should be accepted");
    assert_eq!(accepted.body.lifecycle_state, LifecycleState::Creating);
    let id = accepted.body.id.clone();

    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");
    assert_eq!(
        snapshot.log.last().map(String::as_str),
        Some(format!("filesystem {id} is ready").as_str())
    );

    let described = harness
        .orchestrator
        .get_filesystem(ACCOUNT, SPACE, &id)
        .await
        .expect("filesystem should be visible");
    assert_eq!(described.backup_policy, BackupPolicy::Disabled);
    assert_eq!(described.lifecycle_configuration, TransitionToIa::None);
    assert_eq!(
        described.transition_to_primary_storage_class,
        TransitionToPrimary::None
    );
    assert_eq!(described.mount_targets.len(), 2);
    assert_eq!(described.file_system.kms_key_id, "kms-default");
    assert_eq!(described.access_policy, None);
    assert_eq!(tag_value(&described.file_system.tags, "spinup:org"), Some("acme"));
    assert_eq!(tag_value(&described.file_system.tags, "spinup:spaceid"), Some(SPACE));
}

#[rstest]
#[case::missing_name(named("  "))]
#[case::unknown_backup(FileSystemCreateRequest {
    backup_policy: String::from("SOMETIMES"),
    ..named("alpha")
})]
#[case::unknown_lifecycle(FileSystemCreateRequest {
    lifecycle_configuration: String::from("AFTER_3_DAYS"),
    ..named("alpha")
})]
#[tokio::test]
async fn create_rejects_invalid_requests_before_provisioning(
    harness: Harness,
    #[case] request: FileSystemCreateRequest,
) {
    let err = harness
        .orchestrator
        .create_filesystem(ACCOUNT, SPACE, request)
        .await
        .expect_err("request should be rejected");
    assert_eq!(err.kind, ErrorKind::BadRequest);
    assert!(harness.cloud.control_plane.file_systems().is_empty());
}

#[rstest]
#[tokio::test]
async fn one_zone_pins_the_first_subnet(harness: Harness) {
    let request = FileSystemCreateRequest {
        one_zone: true,
        ..named("alpha")
    };
    let id = harness.provision(SPACE, request).await;

    let file_system = harness
        .cloud
        .control_plane
        .file_system(&id)
        .expect("filesystem should exist");
    assert_eq!(file_system.availability_zone.as_deref(), Some("us-east-1a"));
    let endpoints = harness.cloud.control_plane.mount_endpoints(&id);
    let subnets: Vec<&str> = endpoints.iter().map(|e| e.subnet_id.as_str()).collect();
    assert_eq!(subnets, vec!["subnet-a"]);
}

#[rstest]
#[tokio::test]
async fn one_zone_with_unknown_subnet_is_rejected(harness: Harness) {
    let request = FileSystemCreateRequest {
        one_zone: true,
        subnets: vec![String::from("subnet-zz")],
        ..named("alpha")
    };
    let err = harness
        .orchestrator
        .create_filesystem(ACCOUNT, SPACE, request)
        .await
        .expect_err("placement should fail");
    assert_eq!(err.kind, ErrorKind::BadRequest);
    assert!(harness.cloud.control_plane.file_systems().is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_access_point_rolls_back_the_whole_filesystem(harness: Harness) {
    harness.cloud.control_plane.fail_access_point_create(2);
    let request = FileSystemCreateRequest {
        access_points: vec![access_point("one"), access_point("two")],
        ..named("beta")
    };
    let accepted = harness
        .orchestrator
        .create_filesystem(ACCOUNT, SPACE, request)
        .await
        .expect("create should be accepted");
    let id = accepted.body.id.clone();

    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Failed);
    let failure = snapshot.failure.clone().unwrap_or_default();
    assert!(failure.contains("AccessPointLimitExceeded"), "{failure}");
    assert!(
        snapshot
            .log
            .iter()
            .any(|line| line == "successfully rolled back 2 compensation(s)"),
        "{:?}",
        snapshot.log
    );

    let control_plane = &harness.cloud.control_plane;
    assert!(control_plane.file_systems().is_empty());
    assert!(control_plane.mount_endpoints(&id).is_empty());
    assert!(control_plane.access_points(&id).is_empty());
    let first_access_point = harness
        .cloud
        .journal
        .entries()
        .into_iter()
        .find_map(|entry| entry.strip_prefix("create_access_point ").map(str::to_owned))
        .expect("first access point should have been created");
    assert!(
        harness.journal_index(&format!("delete_access_point {first_access_point}"))
            < harness.journal_index(&format!("delete_file_system {id}"))
    );
}

#[rstest]
#[tokio::test]
async fn failed_mount_endpoint_removes_the_endpoints_already_created(harness: Harness) {
    harness.cloud.control_plane.fail_mount_endpoints_in("subnet-b");
    let accepted = harness
        .orchestrator
        .create_filesystem(ACCOUNT, SPACE, named("beta"))
        .await
        .expect("create should be accepted");
    let id = accepted.body.id.clone();

    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Failed);
    let entries = harness.cloud.journal.entries();
    let created: Vec<&String> = entries
        .iter()
        .filter(|entry| entry.starts_with("create_mount_endpoint"))
        .collect();
    assert_eq!(created.len(), 1);
    assert!(harness.cloud.control_plane.mount_endpoints(&id).is_empty());
    assert!(harness.cloud.control_plane.file_system(&id).is_none());
}

#[rstest]
#[tokio::test]
async fn filesystem_in_error_state_stops_waiting_and_is_removed(harness: Harness) {
    harness
        .cloud
        .control_plane
        .start_file_systems_in(LifecycleState::Error);
    let accepted = harness
        .orchestrator
        .create_filesystem(ACCOUNT, SPACE, named("broken"))
        .await
        .expect("create should be accepted");
    let id = accepted.body.id.clone();

    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Failed);
    let failure = snapshot.failure.unwrap_or_default();
    assert!(failure.contains("entered the error state"), "{failure}");
    assert!(harness.cloud.control_plane.file_system(&id).is_none());
}

#[rstest]
#[tokio::test]
async fn filesystem_that_never_becomes_available_is_removed(harness: Harness) {
    harness
        .cloud
        .control_plane
        .start_file_systems_in(LifecycleState::Updating);
    let accepted = harness
        .orchestrator
        .create_filesystem(ACCOUNT, SPACE, named("stuck"))
        .await
        .expect("create should be accepted");
    let id = accepted.body.id.clone();

    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert!(
        snapshot
            .log
            .iter()
            .any(|line| line == "successfully rolled back 1 compensation(s)"),
        "{:?}",
        snapshot.log
    );
    assert!(harness.cloud.control_plane.file_system(&id).is_none());
    harness.journal_index(&format!("delete_file_system {id}"));
}

#[rstest]
#[tokio::test]
async fn embedded_access_points_complete_with_a_tight_await_budget() {
    let cloud = FakeCloud::new();
    let mut registry = AccountRegistry::new();
    registry.insert(cloud.account(ACCOUNT));
    let tasks = InMemoryTaskStore::new();
    let timing = WorkflowTiming {
        await_policy: RetryPolicy::new(2, Duration::from_millis(1)),
        ..fast_timing()
    };
    let settings = OrchestratorSettings::new("acme").with_timing(timing);
    let orchestrator = Orchestrator::new(registry, Arc::new(tasks.clone()), settings);
    let harness = Harness {
        cloud,
        tasks,
        orchestrator,
    };

    let request = FileSystemCreateRequest {
        access_points: vec![access_point("one"), access_point("two")],
        ..named("alpha")
    };
    let id = harness.provision(SPACE, request).await;
    assert_eq!(harness.cloud.control_plane.access_points(&id).len(), 2);
}

#[rstest]
#[case::none(TransitionToIa::None)]
#[case::after_7_days(TransitionToIa::After7Days)]
#[case::after_14_days(TransitionToIa::After14Days)]
#[case::after_30_days(TransitionToIa::After30Days)]
#[case::after_60_days(TransitionToIa::After60Days)]
#[case::after_90_days(TransitionToIa::After90Days)]
#[tokio::test]
async fn lifecycle_reads_back_the_value_last_set(
    harness: Harness,
    #[case] transition: TransitionToIa,
) {
    let created = harness
        .provision(
            SPACE,
            FileSystemCreateRequest {
                lifecycle_configuration: transition.as_str().to_owned(),
                ..named("created")
            },
        )
        .await;
    let described = harness
        .orchestrator
        .get_filesystem(ACCOUNT, SPACE, &created)
        .await
        .expect("filesystem should be visible");
    assert_eq!(described.lifecycle_configuration, transition);

    let updated = harness.provision(SPACE, named("updated")).await;
    let update = FileSystemUpdateRequest {
        lifecycle_configuration: transition.as_str().to_ascii_lowercase(),
        ..FileSystemUpdateRequest::default()
    };
    let accepted = harness
        .orchestrator
        .update_filesystem(ACCOUNT, SPACE, &updated, update)
        .await
        .expect("update should be accepted");
    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");

    let described = harness
        .orchestrator
        .get_filesystem(ACCOUNT, SPACE, &updated)
        .await
        .expect("filesystem should be visible");
    assert_eq!(described.lifecycle_configuration, transition);
}

#[rstest]
#[tokio::test]
async fn access_policy_round_trips_through_describe(harness: Harness) {
    let request = FileSystemCreateRequest {
        access_policy: Some(AccessPolicyFlags {
            enforce_encrypted_transport: true,
            ..AccessPolicyFlags::default()
        }),
        ..named("alpha")
    };
    let id = harness.provision(SPACE, request).await;

    let described = harness
        .orchestrator
        .get_filesystem(ACCOUNT, SPACE, &id)
        .await
        .expect("filesystem should be visible");
    assert_eq!(
        described.access_policy,
        Some(AccessPolicyFlags {
            allow_anonymous_access: false,
            enforce_encrypted_transport: true,
            allow_execution_role: false,
        })
    );
}

#[rstest]
#[tokio::test]
async fn listing_and_lookups_respect_tenant_scope(harness: Harness) {
    let first = harness.provision("space-1", named("alpha")).await;
    let second = harness.provision("space-2", named("beta")).await;

    let in_space = harness
        .orchestrator
        .list_filesystems(ACCOUNT, Some("space-1"))
        .await
        .expect("listing should succeed");
    assert_eq!(in_space, vec![first.clone()]);

    let everywhere = harness
        .orchestrator
        .list_filesystems(ACCOUNT, None)
        .await
        .expect("listing should succeed");
    assert_eq!(
        everywhere,
        vec![format!("space-1/{first}"), format!("space-2/{second}")]
    );

    let err = harness
        .orchestrator
        .get_filesystem(ACCOUNT, "space-2", &first)
        .await
        .expect_err("filesystem belongs to another space");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[rstest]
#[tokio::test]
async fn unknown_account_is_not_found(harness: Harness) {
    let err = harness
        .orchestrator
        .list_filesystems("nope", None)
        .await
        .expect_err("account should be unknown");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[rstest]
#[tokio::test]
async fn update_fills_blank_lifecycle_fields_from_current_settings(harness: Harness) {
    let request = FileSystemCreateRequest {
        backup_policy: String::from("enabled"),
        lifecycle_configuration: String::from("AFTER_7_DAYS"),
        transition_to_primary_storage_class: String::from("AFTER_1_ACCESS"),
        ..named("alpha")
    };
    let id = harness.provision(SPACE, request).await;

    let update = FileSystemUpdateRequest {
        lifecycle_configuration: String::from("after_30_days"),
        ..FileSystemUpdateRequest::default()
    };
    let accepted = harness
        .orchestrator
        .update_filesystem(ACCOUNT, SPACE, &id, update)
        .await
        .expect("update should be accepted");
    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");

    let described = harness
        .orchestrator
        .get_filesystem(ACCOUNT, SPACE, &id)
        .await
        .expect("filesystem should be visible");
    assert_eq!(described.backup_policy, BackupPolicy::Enabled);
    assert_eq!(described.lifecycle_configuration, TransitionToIa::After30Days);
    assert_eq!(
        described.transition_to_primary_storage_class,
        TransitionToPrimary::After1Access
    );
}

#[rstest]
#[tokio::test]
async fn update_rejects_unknown_backup_policy(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;
    let update = FileSystemUpdateRequest {
        backup_policy: String::from("SOMETIMES"),
        ..FileSystemUpdateRequest::default()
    };
    let err = harness
        .orchestrator
        .update_filesystem(ACCOUNT, SPACE, &id, update)
        .await
        .expect_err("update should be rejected");
    assert_eq!(err.kind, ErrorKind::BadRequest);
}

#[rstest]
#[tokio::test]
async fn update_with_permissive_flags_clears_the_access_policy(harness: Harness) {
    let request = FileSystemCreateRequest {
        access_policy: Some(AccessPolicyFlags::default()),
        ..named("alpha")
    };
    let id = harness.provision(SPACE, request).await;
    assert!(harness.cloud.control_plane.access_policy(&id).is_some());

    let update = FileSystemUpdateRequest {
        access_policy: Some(AccessPolicyFlags {
            allow_anonymous_access: true,
            ..AccessPolicyFlags::default()
        }),
        ..FileSystemUpdateRequest::default()
    };
    let accepted = harness
        .orchestrator
        .update_filesystem(ACCOUNT, SPACE, &id, update)
        .await
        .expect("update should be accepted");
    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");
    assert_eq!(harness.cloud.control_plane.access_policy(&id), None);
}

#[rstest]
#[tokio::test]
async fn update_tags_refreshes_every_user(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;
    harness
        .orchestrator
        .create_user(ACCOUNT, SPACE, &id, user("alice"))
        .await
        .expect("user should be created");

    let update = FileSystemUpdateRequest {
        tags: Some(vec![Tag::new("CostCenter", "42")]),
        ..FileSystemUpdateRequest::default()
    };
    let accepted = harness
        .orchestrator
        .update_filesystem(ACCOUNT, SPACE, &id, update)
        .await
        .expect("update should be accepted");
    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");
    assert!(snapshot.log.iter().any(|line| line == "refreshed tags of 1 user(s)"));

    let users = harness.cloud.identity.users();
    let alice = users.first().expect("user should exist");
    assert_eq!(tag_value(&alice.tags, "CostCenter"), Some("42"));
    assert_eq!(tag_value(&alice.tags, RESOURCE_NAME_TAG), Some("alpha"));
    let file_system = harness
        .cloud
        .control_plane
        .file_system(&id)
        .expect("filesystem should exist");
    assert_eq!(tag_value(&file_system.tags, "CostCenter"), Some("42"));
}

#[rstest]
#[case::file_system_busy(true)]
#[case::endpoint_busy(false)]
#[tokio::test]
async fn delete_refuses_resources_that_are_not_available(
    harness: Harness,
    #[case] file_system_busy: bool,
) {
    let id = harness.provision(SPACE, named("alpha")).await;
    if file_system_busy {
        harness
            .cloud
            .control_plane
            .set_file_system_state(&id, LifecycleState::Updating);
    } else {
        let endpoints = harness.cloud.control_plane.mount_endpoints(&id);
        let endpoint = endpoints.first().expect("endpoint should exist");
        harness
            .cloud
            .control_plane
            .set_mount_endpoint_state(&endpoint.id, LifecycleState::Deleting);
    }

    let err = harness
        .orchestrator
        .delete_filesystem(ACCOUNT, SPACE, &id)
        .await
        .expect_err("delete should be refused");
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(
        harness
            .cloud
            .journal
            .entries()
            .iter()
            .all(|entry| !entry.starts_with("delete_")),
        "nothing should be deleted"
    );
}

#[rstest]
#[tokio::test]
async fn delete_removes_users_endpoints_access_points_then_filesystem(harness: Harness) {
    let request = FileSystemCreateRequest {
        access_points: vec![access_point("data")],
        ..named("gamma")
    };
    let id = harness.provision(SPACE, request).await;
    for name in ["alice", "bob"] {
        harness
            .orchestrator
            .create_user(ACCOUNT, SPACE, &id, user(name))
            .await
            .expect("user should be created");
    }
    harness.cloud.identity.fail_user_delete("gamma-bob");
    let endpoint = harness
        .cloud
        .control_plane
        .mount_endpoints(&id)
        .first()
        .map(|endpoint| endpoint.id.clone())
        .expect("endpoint should exist");
    let access_point_id = harness
        .cloud
        .control_plane
        .access_points(&id)
        .first()
        .map(|access_point| access_point.id.clone())
        .expect("access point should exist");

    let accepted = harness
        .orchestrator
        .delete_filesystem(ACCOUNT, SPACE, &id)
        .await
        .expect("delete should be accepted");
    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");
    assert!(
        snapshot
            .log
            .iter()
            .any(|line| line.starts_with("failed to delete user bob:")),
        "{:?}",
        snapshot.log
    );
    assert!(snapshot.log.iter().any(|line| line == "deleted 1 user(s)"));

    let user_deleted = harness.journal_index("delete_user gamma-alice");
    let endpoint_deleted = harness.journal_index(&format!("delete_mount_endpoint {endpoint}"));
    let access_point_deleted =
        harness.journal_index(&format!("delete_access_point {access_point_id}"));
    let file_system_deleted = harness.journal_index(&format!("delete_file_system {id}"));
    assert!(user_deleted < endpoint_deleted);
    assert!(endpoint_deleted < access_point_deleted);
    assert!(access_point_deleted < file_system_deleted);
    assert!(harness.cloud.control_plane.file_system(&id).is_none());
}

#[rstest]
#[tokio::test]
async fn delete_retries_while_the_filesystem_is_in_use(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;
    harness.cloud.control_plane.fail_file_system_deletes(2);

    let accepted = harness
        .orchestrator
        .delete_filesystem(ACCOUNT, SPACE, &id)
        .await
        .expect("delete should be accepted");
    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");
    assert!(harness.cloud.control_plane.file_system(&id).is_none());
}

#[rstest]
#[tokio::test]
async fn prepare_account_is_idempotent(harness: Harness) {
    let first = harness
        .orchestrator
        .prepare_account(ACCOUNT)
        .await
        .expect("preparation should succeed");
    assert_eq!(first.policy, PolicyAction::Created);
    assert!(first.group_created);
    assert!(first.policy_attached);
    assert_eq!(
        harness.cloud.identity.attached_policies("SpinupEFSAdminGroup-acme"),
        vec![first.policy_arn.clone()]
    );

    let second = harness
        .orchestrator
        .prepare_account(ACCOUNT)
        .await
        .expect("preparation should succeed");
    assert!(!second.changed(), "{second:?}");
    assert_eq!(second.policy_arn, first.policy_arn);
}

#[rstest]
#[tokio::test]
async fn prepare_account_replaces_a_drifted_policy(harness: Harness) {
    let first = harness
        .orchestrator
        .prepare_account(ACCOUNT)
        .await
        .expect("preparation should succeed");
    harness
        .cloud
        .identity
        .update_policy(&first.policy_arn, r#"{"Version":"2012-10-17","Statement":[]}"#)
        .await
        .expect("policy should be replaced");

    let second = harness
        .orchestrator
        .prepare_account(ACCOUNT)
        .await
        .expect("preparation should succeed");
    assert_eq!(second.policy, PolicyAction::Updated);
    assert!(!second.group_created);
    assert!(!second.policy_attached);
}

#[rstest]
#[tokio::test]
async fn users_are_scoped_to_their_filesystem(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;

    let err = harness
        .orchestrator
        .create_user(ACCOUNT, SPACE, &id, user(" "))
        .await
        .expect_err("empty name should be rejected");
    assert_eq!(err.kind, ErrorKind::BadRequest);

    let created = harness
        .orchestrator
        .create_user(ACCOUNT, SPACE, &id, user("alice"))
        .await
        .expect("user should be created");
    assert_eq!(created.user_name, "alice");
    assert!(
        created.arn.ends_with("user/fsorch/acme/space-1/alpha/alpha-alice"),
        "{}",
        created.arn
    );
    assert_eq!(tag_value(&created.tags, RESOURCE_NAME_TAG), Some("alpha"));
    assert_eq!(
        harness.cloud.identity.groups_of("alpha-alice"),
        vec![String::from("SpinupEFSAdminGroup-acme")]
    );

    let listed = harness
        .orchestrator
        .list_users(ACCOUNT, SPACE, &id)
        .await
        .expect("listing should succeed");
    assert_eq!(listed, vec![String::from("alice")]);

    let err = harness
        .orchestrator
        .get_user(ACCOUNT, "space-2", &id, "alice")
        .await
        .expect_err("filesystem belongs to another space");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[rstest]
#[tokio::test]
async fn key_rotation_replaces_previous_keys(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;
    harness
        .orchestrator
        .create_user(ACCOUNT, SPACE, &id, user("alice"))
        .await
        .expect("user should be created");
    let rotate = UserUpdateRequest {
        reset_key: true,
        tags: None,
    };

    let first = harness
        .orchestrator
        .update_user(ACCOUNT, SPACE, &id, "alice", rotate.clone())
        .await
        .expect("rotation should succeed");
    let first_key = first.access_key.expect("a key should be issued");
    assert!(first.deleted_access_keys.is_empty());

    let second = harness
        .orchestrator
        .update_user(ACCOUNT, SPACE, &id, "alice", rotate)
        .await
        .expect("rotation should succeed");
    assert_eq!(second.deleted_access_keys, vec![first_key.access_key_id]);

    let described = harness
        .orchestrator
        .get_user(ACCOUNT, SPACE, &id, "alice")
        .await
        .expect("user should exist");
    assert_eq!(described.access_keys.len(), 1);
}

#[rstest]
#[tokio::test]
async fn deleted_users_are_gone(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;
    harness
        .orchestrator
        .create_user(ACCOUNT, SPACE, &id, user("alice"))
        .await
        .expect("user should be created");

    harness
        .orchestrator
        .delete_user(ACCOUNT, SPACE, &id, "alice")
        .await
        .expect("user should be deleted");
    assert!(harness.cloud.identity.users().is_empty());

    let err = harness
        .orchestrator
        .get_user(ACCOUNT, SPACE, &id, "alice")
        .await
        .expect_err("user should be gone");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[rstest]
#[tokio::test]
async fn standalone_access_point_lifecycle(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;

    let accepted = harness
        .orchestrator
        .create_access_point(ACCOUNT, SPACE, &id, access_point("scratch"))
        .await
        .expect("create should be accepted");
    let access_point_id = accepted.body.id.clone();
    assert_eq!(accepted.body.name, "alpha-scratch");
    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Completed, "{snapshot:?}");

    let described = harness
        .orchestrator
        .get_access_point(ACCOUNT, SPACE, &id, &access_point_id)
        .await
        .expect("access point should exist");
    assert_eq!(described.lifecycle_state, LifecycleState::Available);

    let err = harness
        .orchestrator
        .get_access_point(ACCOUNT, SPACE, &id, "fsap-9999")
        .await
        .expect_err("access point should be unknown");
    assert_eq!(err.kind, ErrorKind::NotFound);

    harness
        .orchestrator
        .delete_access_point(ACCOUNT, SPACE, &id, &access_point_id)
        .await
        .expect("access point should be deleted");
    let listed = harness
        .orchestrator
        .list_access_points(ACCOUNT, SPACE, &id)
        .await
        .expect("listing should succeed");
    assert!(listed.is_empty());
}

#[rstest]
#[tokio::test]
async fn unnamed_access_point_gets_a_generated_name(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;
    let accepted = harness
        .orchestrator
        .create_access_point(ACCOUNT, SPACE, &id, AccessPointCreateRequest::default())
        .await
        .expect("create should be accepted");
    let suffix = accepted
        .body
        .name
        .strip_prefix("alpha-")
        .expect("name should carry the filesystem prefix");
    assert_eq!(suffix.len(), 36, "{suffix}");
    harness.finish(accepted).await;
}

#[rstest]
#[tokio::test]
async fn access_point_in_error_state_fails_its_task(harness: Harness) {
    let id = harness.provision(SPACE, named("alpha")).await;
    harness
        .cloud
        .control_plane
        .start_access_points_in(LifecycleState::Error);

    let accepted = harness
        .orchestrator
        .create_access_point(ACCOUNT, SPACE, &id, access_point("scratch"))
        .await
        .expect("create should be accepted");
    let snapshot = harness.finish(accepted).await;
    assert_eq!(snapshot.status, TaskStatus::Failed);
}
