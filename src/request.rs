//! Resolved, immutable description of one image build.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::resources::SshKeyId;

/// Default login user handed to provisioners.
pub const DEFAULT_SSH_USERNAME: &str = "root";

/// Parameters for one image build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageRequest {
    /// Server type id or name (for example `cx11`).
    pub server_type: String,
    /// Source image id or name (for example `ubuntu-20.04`).
    pub source_image: String,
    /// Optional location name.
    pub location: Option<String>,
    /// Optional datacenter name.
    pub datacenter: Option<String>,
    /// Name recorded on the snapshot.
    pub image_name: String,
    /// Optional cloud-init payload passed at server creation.
    pub user_data: Option<String>,
    /// Existing SSH key to reuse instead of registering a temporary one.
    pub ssh_key_id: Option<SshKeyId>,
    /// Login user handed to provisioners.
    pub ssh_username: String,
    /// Labels attached to the snapshot.
    pub snapshot_labels: BTreeMap<String, String>,
}

impl ImageRequest {
    /// Starts a builder for an [`ImageRequest`].
    #[must_use]
    pub fn builder() -> ImageRequestBuilder {
        ImageRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when a required string field is
    /// empty, or [`RequestError::EmptyUserData`] when user-data is blank.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.server_type.is_empty() {
            return Err(RequestError::Validation("server_type".to_owned()));
        }
        if self.source_image.is_empty() {
            return Err(RequestError::Validation("source_image".to_owned()));
        }
        if self.image_name.is_empty() {
            return Err(RequestError::Validation("image_name".to_owned()));
        }
        if self.ssh_username.is_empty() {
            return Err(RequestError::Validation("ssh_username".to_owned()));
        }
        if self
            .user_data
            .as_deref()
            .is_some_and(|payload| payload.trim().is_empty())
        {
            return Err(RequestError::EmptyUserData);
        }
        Ok(())
    }
}

/// Builder for [`ImageRequest`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImageRequestBuilder {
    server_type: String,
    source_image: String,
    location: Option<String>,
    datacenter: Option<String>,
    image_name: String,
    user_data: Option<String>,
    ssh_key_id: Option<SshKeyId>,
    ssh_username: Option<String>,
    snapshot_labels: BTreeMap<String, String>,
}

impl ImageRequestBuilder {
    /// Creates an empty builder; required fields must be populated before
    /// build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server type.
    #[must_use]
    pub fn server_type(mut self, value: impl Into<String>) -> Self {
        self.server_type = value.into();
        self
    }

    /// Sets the source image.
    #[must_use]
    pub fn source_image(mut self, value: impl Into<String>) -> Self {
        self.source_image = value.into();
        self
    }

    /// Sets the optional location.
    #[must_use]
    pub fn location(mut self, value: Option<String>) -> Self {
        self.location = value;
        self
    }

    /// Sets the optional datacenter.
    #[must_use]
    pub fn datacenter(mut self, value: Option<String>) -> Self {
        self.datacenter = value;
        self
    }

    /// Sets the snapshot name.
    #[must_use]
    pub fn image_name(mut self, value: impl Into<String>) -> Self {
        self.image_name = value.into();
        self
    }

    /// Sets the optional user-data payload. The payload is kept verbatim.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Reuses an existing SSH key.
    #[must_use]
    pub const fn ssh_key_id(mut self, value: Option<SshKeyId>) -> Self {
        self.ssh_key_id = value;
        self
    }

    /// Sets the login user. Defaults to [`DEFAULT_SSH_USERNAME`].
    #[must_use]
    pub fn ssh_username(mut self, value: impl Into<String>) -> Self {
        self.ssh_username = Some(value.into());
        self
    }

    /// Adds a label to the snapshot.
    #[must_use]
    pub fn snapshot_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.snapshot_labels.insert(key.into(), value.into());
        self
    }

    /// Builds and validates the [`ImageRequest`]. Optional names that are
    /// blank after trimming are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when a required field is empty.
    pub fn build(self) -> Result<ImageRequest, RequestError> {
        let request = ImageRequest {
            server_type: self.server_type.trim().to_owned(),
            source_image: self.source_image.trim().to_owned(),
            location: trimmed_option(self.location),
            datacenter: trimmed_option(self.datacenter),
            image_name: self.image_name.trim().to_owned(),
            user_data: self.user_data,
            ssh_key_id: self.ssh_key_id.filter(|id| !id.is_unset()),
            ssh_username: self
                .ssh_username
                .map_or_else(|| DEFAULT_SSH_USERNAME.to_owned(), |name| name.trim().to_owned()),
            snapshot_labels: self.snapshot_labels,
        };
        request.validate()?;
        Ok(request)
    }
}

fn trimmed_option(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Errors raised while building an [`ImageRequest`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a required field is missing.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when a user-data payload is present but blank.
    #[error("user-data must not be empty")]
    EmptyUserData,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_builder() -> ImageRequestBuilder {
        ImageRequest::builder()
            .server_type(" cx11 ")
            .source_image("ubuntu-20.04")
            .image_name("my-image")
    }

    #[test]
    fn build_trims_and_defaults() {
        let request = valid_builder()
            .location(Some(String::from("  ")))
            .datacenter(Some(String::from(" fsn1-dc14 ")))
            .build()
            .expect("request should build");

        assert_eq!(request.server_type, "cx11");
        assert_eq!(request.location, None);
        assert_eq!(request.datacenter.as_deref(), Some("fsn1-dc14"));
        assert_eq!(request.ssh_username, DEFAULT_SSH_USERNAME);
        assert_eq!(request.ssh_key_id, None);
    }

    #[test]
    fn build_rejects_missing_image_name() {
        let err = ImageRequest::builder()
            .server_type("cx11")
            .source_image("ubuntu-20.04")
            .build()
            .expect_err("image name is required");
        assert_eq!(err, RequestError::Validation(String::from("image_name")));
    }

    #[test]
    fn build_rejects_blank_user_data() {
        let err = valid_builder()
            .user_data(Some(String::from("\n  ")))
            .build()
            .expect_err("blank user-data is rejected");
        assert_eq!(err, RequestError::EmptyUserData);
    }

    #[test]
    fn zero_ssh_key_id_means_generate() {
        let request = valid_builder()
            .ssh_key_id(Some(SshKeyId::new(0)))
            .build()
            .expect("request should build");
        assert_eq!(request.ssh_key_id, None);
    }
}
