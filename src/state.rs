//! Per-build run context threaded through the steps.
//!
//! Each output field has exactly one producing step. Later steps read it
//! through the `require_*` accessors, which turn a missing producer into a
//! [`StepError::MissingState`] instead of a panic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;

use crate::artifact::ImageArtifact;
use crate::client::CloudClient;
use crate::provision::{Connection, Provisioner};
use crate::request::ImageRequest;
use crate::resources::{Server, SshKeyId};
use crate::step::StepError;
use crate::ui::Ui;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Polling and timeout settings shared by the steps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuildTimings {
    /// Interval between provider polls.
    pub poll_interval: Duration,
    /// Upper bound for every wait loop.
    pub wait_timeout: Duration,
    /// Whether to probe the SSH port before hand-off.
    pub ssh_probe: bool,
}

impl BuildTimings {
    /// Starts a deadline for one wait loop.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.wait_timeout)
    }
}

impl Default for BuildTimings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
            ssh_probe: true,
        }
    }
}

/// Instant after which a wait loop gives up.
///
/// A timeout too large to add to the current instant never expires.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// Starts a deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// Returns `true` once the deadline lies in the past.
    #[must_use]
    pub fn has_passed(self) -> bool {
        self.0.is_some_and(|at| Instant::now() > at)
    }
}

/// SSH credentials installed on the server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshCredentials {
    /// Registered key id.
    pub key_id: SshKeyId,
    /// Private key file, when this build generated the key.
    pub private_key: Option<Utf8PathBuf>,
}

/// State for one build invocation.
pub struct BuildState<C: CloudClient> {
    /// Provider client, shared read-only.
    pub client: Arc<C>,
    /// Resolved build parameters.
    pub request: ImageRequest,
    /// User-interaction sink.
    pub ui: Arc<dyn Ui>,
    /// Provisioning hook.
    pub provisioner: Arc<dyn Provisioner>,
    /// Polling settings.
    pub timings: BuildTimings,
    /// Produced by the SSH key step.
    pub ssh_key: Option<SshCredentials>,
    /// Produced by the create-server step.
    pub server: Option<Server>,
    /// Produced by the wait-for-ready step.
    pub connection: Option<Connection>,
    /// Produced by the capture-image step.
    pub image: Option<ImageArtifact>,
}

impl<C: CloudClient> BuildState<C> {
    /// Creates an empty context for one build.
    #[must_use]
    pub fn new(
        client: Arc<C>,
        request: ImageRequest,
        ui: Arc<dyn Ui>,
        provisioner: Arc<dyn Provisioner>,
        timings: BuildTimings,
    ) -> Self {
        Self {
            client,
            request,
            ui,
            provisioner,
            timings,
            ssh_key: None,
            server: None,
            connection: None,
            image: None,
        }
    }

    /// Returns the registered SSH key.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::MissingState`] when no key step has run.
    pub fn require_ssh_key(&self) -> Result<&SshCredentials, StepError<C::Error>> {
        self.ssh_key
            .as_ref()
            .ok_or(StepError::MissingState { entry: "ssh_key" })
    }

    /// Returns the created server.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::MissingState`] when no server was created.
    pub fn require_server(&self) -> Result<&Server, StepError<C::Error>> {
        self.server
            .as_ref()
            .ok_or(StepError::MissingState { entry: "server" })
    }

    /// Returns the connection details of the ready server.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::MissingState`] when the server is not ready.
    pub fn require_connection(&self) -> Result<&Connection, StepError<C::Error>> {
        self.connection
            .as_ref()
            .ok_or(StepError::MissingState {
                entry: "connection",
            })
    }
}
