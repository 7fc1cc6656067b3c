//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("hcloud-imager");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[test]
fn help_lists_the_build_command() {
    let mut cmd = cargo_bin_cmd!("hcloud-imager");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("build"));
}

#[test]
fn build_without_configuration_reports_the_missing_token() {
    let mut cmd = cargo_bin_cmd!("hcloud-imager");
    cmd.arg("build")
        .env_remove("HCLOUD_TOKEN")
        .env_remove("HCLOUD_IMAGER_CONFIG_PATH")
        .env("HOME", env!("CARGO_TARGET_TMPDIR"))
        .env("XDG_CONFIG_HOME", env!("CARGO_TARGET_TMPDIR"))
        .current_dir(env!("CARGO_TARGET_TMPDIR"))
        .assert()
        .failure()
        .stderr(contains("token"));
}
