//! BDD scenarios for the image build pipeline.

use rstest_bdd_macros::scenario;

use super::test_helpers::{BuildHarness, harness};

#[scenario(
    path = "tests/features/build.feature",
    name = "Healthy build produces an image and removes the server"
)]
fn scenario_healthy_build(harness: BuildHarness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Snapshot failure still deletes the server"
)]
fn scenario_snapshot_failure(harness: BuildHarness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Unknown server type stops before anything is created"
)]
fn scenario_unknown_server_type(harness: BuildHarness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Provisioner failure still deletes the server"
)]
fn scenario_provisioner_failure(harness: BuildHarness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Cleanup failure after a successful run is reported"
)]
fn scenario_cleanup_failure(harness: BuildHarness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "An existing SSH key is reused and left in place"
)]
fn scenario_existing_key(harness: BuildHarness) {
    drop(harness);
}
