//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::request::{ImageRequest, RequestError};
use crate::resources::SshKeyId;
use crate::state::BuildTimings;
use crate::user_data::{UserDataError, resolve_user_data};

/// Default Hetzner Cloud API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.hetzner.cloud/v1";

/// Build configuration derived from defaults, configuration files,
/// environment variables and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HCLOUD",
    discovery(
        app_name = "hcloud-imager",
        env_var = "HCLOUD_IMAGER_CONFIG_PATH",
        config_file_name = "hcloud-imager.toml",
        dotfile_name = ".hcloud-imager.toml",
        project_file_name = "hcloud-imager.toml"
    )
)]
pub struct BuildConfig {
    /// API token used for authentication. This value is required.
    pub token: String,
    /// Base URL of the API.
    #[ortho_config(default = DEFAULT_ENDPOINT.to_owned())]
    pub endpoint: String,
    /// Server type id or name used for the temporary server.
    pub server_type: String,
    /// Image id or name the temporary server boots from.
    pub source_image: String,
    /// Optional location name (for example `fsn1`).
    pub location: Option<String>,
    /// Optional datacenter name (for example `fsn1-dc14`).
    pub datacenter: Option<String>,
    /// Name recorded on the resulting snapshot.
    pub image_name: String,
    /// Inline user-data payload.
    pub user_data: Option<String>,
    /// Path to a file holding the user-data payload.
    pub user_data_file: Option<String>,
    /// Existing SSH key to reuse. When unset a temporary key is generated.
    pub ssh_key_id: Option<u64>,
    /// Login user handed to provisioners.
    #[ortho_config(default = crate::request::DEFAULT_SSH_USERNAME.to_owned())]
    pub ssh_username: String,
    /// Path to the `ssh-keygen` executable.
    #[ortho_config(default = crate::keygen::DEFAULT_SSH_KEYGEN_BIN.to_owned())]
    pub ssh_keygen_bin: String,
    /// Whether to wait for the SSH port to accept connections before
    /// handing off to provisioners.
    #[ortho_config(default = true)]
    pub ssh_probe: bool,
    /// Local program invoked as the provisioner.
    pub provision_command: Option<String>,
    /// Interval between provider polls, in milliseconds.
    #[ortho_config(default = 1000)]
    pub poll_interval_ms: u64,
    /// Upper bound for every wait loop, in seconds.
    #[ortho_config(default = 600)]
    pub wait_timeout_secs: u64,
    /// Timeout applied to each HTTP request, in seconds.
    #[ortho_config(default = 60)]
    pub request_timeout_secs: u64,
    /// Tracing filter expression.
    #[ortho_config(default = "warn".to_owned())]
    pub log_filter: String,
    /// Emit log lines as JSON.
    #[ortho_config(default = false)]
    pub log_json: bool,
}

/// Values supplied on the command line that take precedence over loaded
/// configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuildOverrides {
    /// Replacement server type.
    pub server_type: Option<String>,
    /// Replacement source image.
    pub source_image: Option<String>,
    /// Replacement snapshot name.
    pub image_name: Option<String>,
    /// Replacement location.
    pub location: Option<String>,
    /// Replacement datacenter.
    pub datacenter: Option<String>,
    /// Replacement inline user-data.
    pub user_data: Option<String>,
    /// Replacement user-data file.
    pub user_data_file: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl BuildConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to hcloud-imager.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("hcloud-imager")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies command-line overrides. A user-data override of either kind
    /// replaces both configured user-data sources.
    pub fn apply_overrides(&mut self, overrides: BuildOverrides) {
        let BuildOverrides {
            server_type,
            source_image,
            image_name,
            location,
            datacenter,
            user_data,
            user_data_file,
        } = overrides;

        if let Some(value) = server_type {
            self.server_type = value;
        }
        if let Some(value) = source_image {
            self.source_image = value;
        }
        if let Some(value) = image_name {
            self.image_name = value;
        }
        if location.is_some() {
            self.location = location;
        }
        if datacenter.is_some() {
            self.datacenter = datacenter;
        }
        if user_data.is_some() || user_data_file.is_some() {
            self.user_data = user_data;
            self.user_data_file = user_data_file;
        }
    }

    /// Performs semantic validation on required fields. Error messages
    /// include guidance on how to provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::InvalidValue`] when a timing value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.token,
            &FieldMetadata::new("Hetzner Cloud API token", "HCLOUD_TOKEN", "token"),
        )?;
        Self::require_field(
            &self.endpoint,
            &FieldMetadata::new("API endpoint", "HCLOUD_ENDPOINT", "endpoint"),
        )?;
        Self::require_field(
            &self.server_type,
            &FieldMetadata::new("server type", "HCLOUD_SERVER_TYPE", "server_type"),
        )?;
        Self::require_field(
            &self.source_image,
            &FieldMetadata::new("source image", "HCLOUD_SOURCE_IMAGE", "source_image"),
        )?;
        Self::require_field(
            &self.image_name,
            &FieldMetadata::new("snapshot name", "HCLOUD_IMAGE_NAME", "image_name"),
        )?;
        Self::require_field(
            &self.ssh_username,
            &FieldMetadata::new("SSH username", "HCLOUD_SSH_USERNAME", "ssh_username"),
        )?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "poll_interval_ms must be greater than zero",
            )));
        }
        if self.wait_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "wait_timeout_secs must be greater than zero",
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "request_timeout_secs must be greater than zero",
            )));
        }
        Ok(())
    }

    /// Builds an [`ImageRequest`], resolving user-data from its inline or
    /// file source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or user-data cannot be
    /// resolved.
    pub fn as_request(&self) -> Result<ImageRequest, ConfigError> {
        self.validate()?;
        let user_data =
            resolve_user_data(self.user_data.as_deref(), self.user_data_file.as_deref())?;
        let request = ImageRequest::builder()
            .server_type(&self.server_type)
            .source_image(&self.source_image)
            .location(self.location.clone())
            .datacenter(self.datacenter.clone())
            .image_name(&self.image_name)
            .user_data(user_data)
            .ssh_key_id(self.ssh_key_id.map(SshKeyId::new))
            .ssh_username(&self.ssh_username)
            .snapshot_label("managed-by", "hcloud-imager")
            .build()?;
        Ok(request)
    }

    /// Returns the polling and timeout settings for the pipeline.
    #[must_use]
    pub const fn timings(&self) -> BuildTimings {
        BuildTimings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
            ssh_probe: self.ssh_probe,
        }
    }

    /// Returns the HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Surfaces user-data resolution failures.
    #[error(transparent)]
    UserData(#[from] UserDataError),
    /// Surfaces request validation failures.
    #[error("invalid build request: {0}")]
    Request(#[from] RequestError),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
