//! Unit tests for configuration validation and request conversion.

use std::time::Duration;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use hcloud_imager::config::{BuildConfig, BuildOverrides, ConfigError, DEFAULT_ENDPOINT};
use hcloud_imager::resources::SshKeyId;
use hcloud_imager::user_data::UserDataError;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn valid_config() -> BuildConfig {
    BuildConfig {
        token: String::from("hcloud-token-example"),
        endpoint: String::from(DEFAULT_ENDPOINT),
        server_type: String::from("cx11"),
        source_image: String::from("ubuntu-20.04"),
        location: None,
        datacenter: None,
        image_name: String::from("my-image"),
        user_data: None,
        user_data_file: None,
        ssh_key_id: None,
        ssh_username: String::from("root"),
        ssh_keygen_bin: String::from("ssh-keygen"),
        ssh_probe: true,
        provision_command: None,
        poll_interval_ms: 1000,
        wait_timeout_secs: 600,
        request_timeout_secs: 60,
        log_filter: String::from("warn"),
        log_json: false,
    }
}

fn write_temp_file(name: &str, content: &str) -> (TempDir, String) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write(name, content)
        .unwrap_or_else(|err| panic!("write file: {err}"));
    (tmp, root.join(name).into_string())
}

#[rstest]
#[case::token(|cfg: &mut BuildConfig| cfg.token.clear(), "HCLOUD_TOKEN", "token")]
#[case::server_type(
    |cfg: &mut BuildConfig| cfg.server_type.clear(),
    "HCLOUD_SERVER_TYPE",
    "server_type"
)]
#[case::source_image(
    |cfg: &mut BuildConfig| cfg.source_image.clear(),
    "HCLOUD_SOURCE_IMAGE",
    "source_image"
)]
#[case::image_name(
    |cfg: &mut BuildConfig| cfg.image_name = String::from("  "),
    "HCLOUD_IMAGE_NAME",
    "image_name"
)]
fn validation_errors_name_env_var_and_toml_key(
    valid_config: BuildConfig,
    #[case] mutate: fn(&mut BuildConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(message.contains(env_var), "error should mention {env_var}: {message}");
    assert!(
        message.contains("hcloud-imager.toml"),
        "error should mention config file: {message}"
    );
    assert!(message.contains(toml_key), "error should mention {toml_key}: {message}");
}

#[rstest]
fn zero_wait_timeout_is_rejected(valid_config: BuildConfig) {
    let cfg = BuildConfig {
        wait_timeout_secs: 0,
        ..valid_config
    };

    let err = cfg.validate().expect_err("zero timeout");

    assert!(matches!(err, ConfigError::InvalidValue(_)), "got {err:?}");
}

#[rstest]
fn as_request_carries_configured_values(valid_config: BuildConfig) {
    let cfg = BuildConfig {
        location: Some(String::from("fsn1")),
        ssh_key_id: Some(77),
        ..valid_config
    };

    let request = cfg
        .as_request()
        .unwrap_or_else(|err| panic!("valid config yields request: {err}"));

    assert_eq!(request.server_type, "cx11");
    assert_eq!(request.source_image, "ubuntu-20.04");
    assert_eq!(request.image_name, "my-image");
    assert_eq!(request.location.as_deref(), Some("fsn1"));
    assert_eq!(request.ssh_key_id, Some(SshKeyId::new(77)));
    assert_eq!(request.user_data, None);
    assert_eq!(
        request.snapshot_labels.get("managed-by").map(String::as_str),
        Some("hcloud-imager")
    );
}

#[rstest]
fn timings_follow_configuration(valid_config: BuildConfig) {
    let cfg = BuildConfig {
        poll_interval_ms: 250,
        wait_timeout_secs: 30,
        ssh_probe: false,
        ..valid_config
    };

    let timings = cfg.timings();

    assert_eq!(timings.poll_interval, Duration::from_millis(250));
    assert_eq!(timings.wait_timeout, Duration::from_secs(30));
    assert!(!timings.ssh_probe);
    assert_eq!(cfg.request_timeout(), Duration::from_secs(60));
}

#[rstest]
fn inline_and_file_user_data_conflict(valid_config: BuildConfig) {
    let cfg = BuildConfig {
        user_data: Some(String::from("#cloud-config\n")),
        user_data_file: Some(String::from("/tmp/user-data.yml")),
        ..valid_config
    };

    let err = cfg.as_request().expect_err("conflict");

    assert_eq!(err, ConfigError::UserData(UserDataError::BothProvided));
}

#[rstest]
fn user_data_is_read_from_file(valid_config: BuildConfig) {
    let (_tmp, path) = write_temp_file("user-data.yml", "#cloud-config\npackages: [jq]\n");
    let cfg = BuildConfig {
        user_data_file: Some(path),
        ..valid_config
    };

    let request = cfg
        .as_request()
        .unwrap_or_else(|err| panic!("as_request should succeed: {err}"));

    assert_eq!(
        request.user_data.as_deref(),
        Some("#cloud-config\npackages: [jq]\n")
    );
}

#[rstest]
fn blank_user_data_file_is_rejected(valid_config: BuildConfig) {
    let (_tmp, path) = write_temp_file("empty.yml", "  \n\t ");
    let cfg = BuildConfig {
        user_data_file: Some(path),
        ..valid_config
    };

    let err = cfg.as_request().expect_err("blank file");

    assert_eq!(err, ConfigError::UserData(UserDataError::FileEmpty));
}

#[rstest]
fn overrides_replace_loaded_values(valid_config: BuildConfig) {
    let mut cfg = BuildConfig {
        user_data_file: Some(String::from("/srv/user-data.yml")),
        ..valid_config
    };

    cfg.apply_overrides(BuildOverrides {
        server_type: Some(String::from("cpx21")),
        image_name: Some(String::from("nightly")),
        user_data: Some(String::from("#cloud-config\n")),
        ..BuildOverrides::default()
    });

    assert_eq!(cfg.server_type, "cpx21");
    assert_eq!(cfg.image_name, "nightly");
    assert_eq!(cfg.source_image, "ubuntu-20.04");
    assert_eq!(cfg.user_data.as_deref(), Some("#cloud-config\n"));
    assert_eq!(cfg.user_data_file, None);
}
