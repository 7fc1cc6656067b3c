//! Harness shared by the build scenarios.

use std::cell::RefCell;
use std::sync::Arc;

use hcloud_imager::keygen::DEFAULT_SSH_KEYGEN_BIN;
use hcloud_imager::provision::{Connection, ProvisionError, ProvisionFuture, Provisioner};
use hcloud_imager::test_support::{
    RecordingUi, ScriptedClient, ScriptedClientError, ScriptedRunner, fast_timings,
};
use hcloud_imager::{BuildError, ImageArtifact, ImageBuilder, ImageRequest, KeyGenerator, Ui};
use rstest::fixture;
use tokio::runtime::Runtime;

/// Outcome of one pipeline run against the scripted client.
pub type BuildOutcome = Result<ImageArtifact, BuildError<ScriptedClientError>>;

/// Provisioner that always fails, standing in for a broken playbook.
pub struct FailingProvisioner;

impl Provisioner for FailingProvisioner {
    fn provision<'a>(&'a self, _: &'a Connection, _: &'a dyn Ui) -> ProvisionFuture<'a> {
        Box::pin(async {
            Err(ProvisionError::Failed {
                program: String::from("./provision.sh"),
                status_text: String::from("2"),
                stderr: String::from("playbook failed"),
            })
        })
    }
}

pub struct BuildHarness {
    pub client: ScriptedClient,
    pub ui: RecordingUi,
    pub runner: ScriptedRunner,
    pub request: RefCell<Option<ImageRequest>>,
    pub provisioner: RefCell<Option<Arc<dyn Provisioner>>>,
    pub outcome: RefCell<Option<BuildOutcome>>,
}

impl BuildHarness {
    fn new() -> Self {
        Self {
            client: ScriptedClient::new(),
            ui: RecordingUi::new(),
            runner: ScriptedRunner::new(),
            request: RefCell::new(None),
            provisioner: RefCell::new(None),
            outcome: RefCell::new(None),
        }
    }

    pub fn run_build(&self) {
        let Some(request) = self.request.borrow().clone() else {
            panic!("scenario did not configure a build request");
        };
        self.runner.push_keygen_success("ssh-ed25519 AAAAC3Nza scenario");
        let provisioner = self
            .provisioner
            .borrow()
            .clone()
            .unwrap_or_else(|| Arc::new(hcloud_imager::ReportingProvisioner));
        let builder = ImageBuilder::new(
            Arc::new(self.client.clone()),
            Arc::new(self.ui.clone()),
            provisioner,
            KeyGenerator::new(self.runner.clone(), DEFAULT_SSH_KEYGEN_BIN),
            fast_timings(),
        );

        let runtime = Runtime::new().unwrap_or_else(|err| panic!("tokio runtime: {err}"));
        let outcome = runtime.block_on(async { builder.build(&request).await });
        *self.outcome.borrow_mut() = Some(outcome);
    }

    pub fn with_outcome<T>(&self, inspect: impl FnOnce(&BuildOutcome) -> T) -> T {
        let outcome = self.outcome.borrow();
        let Some(outcome) = outcome.as_ref() else {
            panic!("the build has not run");
        };
        inspect(outcome)
    }
}

#[fixture]
pub fn harness() -> BuildHarness {
    BuildHarness::new()
}
