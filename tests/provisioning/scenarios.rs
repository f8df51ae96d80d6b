//! BDD scenarios for the provisioning workflows.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisioningContext, provisioning_context};

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Provision a filesystem with default settings"
)]
fn scenario_provision_defaults(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Roll back a filesystem whose access point fails"
)]
fn scenario_rollback_on_access_point_failure(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Delete a filesystem past a failing user delete"
)]
fn scenario_delete_past_user_failure(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Refuse to delete a filesystem that is not available"
)]
fn scenario_delete_precondition(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Update the lifecycle configuration"
)]
fn scenario_update_lifecycle(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}
