//! BDD step definitions for the image build pipeline.

use std::sync::Arc;

use hcloud_imager::resources::SshKeyId;
use hcloud_imager::step::ResourceKind;
use hcloud_imager::test_support::{ClientCall, ScriptedClientError};
use hcloud_imager::{BuildError, ImageRequest};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{BuildHarness, FailingProvisioner};

#[given("a healthy Hetzner project")]
fn healthy_project(harness: &BuildHarness) {
    assert!(harness.client.calls().is_empty());
}

#[given(
    "a build request for server type \"{server_type}\" from image \"{image}\" named \"{name}\""
)]
fn build_request(harness: &BuildHarness, server_type: String, image: String, name: String) {
    let request = ImageRequest::builder()
        .server_type(server_type)
        .source_image(image)
        .image_name(name)
        .build()
        .unwrap_or_else(|err| panic!("request should build: {err}"));
    *harness.request.borrow_mut() = Some(request);
}

#[given("snapshot creation fails")]
fn snapshot_fails(harness: &BuildHarness) {
    harness.client.fail_on(ScriptedClientError::CreateImage);
}

#[given("the server type does not exist")]
fn server_type_missing(harness: &BuildHarness) {
    harness.client.missing(ResourceKind::ServerType);
}

#[given("the provisioner fails")]
fn provisioner_fails(harness: &BuildHarness) {
    *harness.provisioner.borrow_mut() = Some(Arc::new(FailingProvisioner));
}

#[given("server deletion fails")]
fn deletion_fails(harness: &BuildHarness) {
    harness.client.fail_on(ScriptedClientError::DeleteServer);
}

#[given("the build reuses SSH key {id}")]
fn reuse_key(harness: &BuildHarness, id: u64) {
    let mut slot = harness.request.borrow_mut();
    let Some(request) = slot.as_mut() else {
        panic!("configure the build request first");
    };
    request.ssh_key_id = Some(SshKeyId::new(id));
}

#[when("the image build runs")]
fn image_build_runs(harness: &BuildHarness) {
    harness.run_build();
}

#[then("the build produces an image named \"{name}\"")]
fn build_produces_image(harness: &BuildHarness, name: String) {
    harness.with_outcome(|outcome| match outcome {
        Ok(artifact) => assert_eq!(artifact.name, name),
        Err(err) => panic!("expected success, got {err}"),
    });
}

#[then("the build fails in step \"{step}\"")]
fn build_fails_in_step(harness: &BuildHarness, step: String) {
    harness.with_outcome(|outcome| match outcome {
        Err(BuildError::Step { step: failed, .. }) => assert_eq!(*failed, step.as_str()),
        other => panic!("expected failure in {step}, got {other:?}"),
    });
}

#[then("the build fails while cleaning up \"{step}\"")]
fn build_fails_in_cleanup(harness: &BuildHarness, step: String) {
    harness.with_outcome(|outcome| match outcome {
        Err(BuildError::Cleanup { step: failed, .. }) => assert_eq!(*failed, step.as_str()),
        other => panic!("expected cleanup failure in {step}, got {other:?}"),
    });
}

#[then("the number of created servers is {count}")]
fn created_server_count(harness: &BuildHarness, count: usize) {
    assert_eq!(harness.client.created_servers().len(), count);
}

#[then("the number of deleted servers is {count}")]
fn deleted_server_count(harness: &BuildHarness, count: usize) {
    assert_eq!(harness.client.deleted_servers().len(), count);
}

#[then("the snapshot description is \"{description}\"")]
fn snapshot_description(harness: &BuildHarness, description: String) {
    let images = harness.client.created_images();
    assert_eq!(images.len(), 1, "expected one snapshot, got {images:?}");
    assert!(images.iter().all(|opts| opts.description == description));
}

#[then("the deleted server is the one that was created")]
fn deleted_server_matches_created(harness: &BuildHarness) {
    let created = harness.client.created_server_ids();
    let deleted = harness.client.deleted_servers();
    assert_eq!(created.len(), 1, "expected one server, got {created:?}");
    assert_eq!(deleted, created);
}

#[then("the temporary SSH key was deleted")]
fn temporary_key_deleted(harness: &BuildHarness) {
    let deletes = harness
        .client
        .calls()
        .into_iter()
        .filter(|call| matches!(call, ClientCall::DeleteSshKey(_)))
        .count();
    assert_eq!(deletes, 1);
}

#[then("no SSH key was registered or deleted")]
fn key_left_in_place(harness: &BuildHarness) {
    assert!(!harness.client.calls().iter().any(|call| matches!(
        call,
        ClientCall::CreateSshKey | ClientCall::DeleteSshKey(_)
    )));
}

#[then("the user is warned that manual cleanup may be required")]
fn manual_cleanup_warning(harness: &BuildHarness) {
    let errors = harness.ui.errors();
    assert!(
        errors
            .iter()
            .any(|message| message.contains("manual cleanup")),
        "expected a manual cleanup warning, got {errors:?}"
    );
}
