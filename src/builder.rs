//! Entry point that assembles the step pipeline for one image build.

use std::sync::Arc;

use crate::artifact::ImageArtifact;
use crate::client::CloudClient;
use crate::command::CommandRunner;
use crate::keygen::KeyGenerator;
use crate::provision::Provisioner;
use crate::request::ImageRequest;
use crate::runner::{BuildError, StepRunner};
use crate::state::{BuildState, BuildTimings};
use crate::step::Step;
use crate::steps::{CaptureImage, CreateServer, EnsureSshKey, HandOffToProvisioners, WaitForServer};
use crate::ui::Ui;

/// Builds snapshot images with a shared client.
///
/// Each call to [`ImageBuilder::build`] owns its own [`BuildState`], so one
/// builder may serve several concurrent builds.
pub struct ImageBuilder<C: CloudClient, R: CommandRunner + Clone + 'static> {
    client: Arc<C>,
    ui: Arc<dyn Ui>,
    provisioner: Arc<dyn Provisioner>,
    keygen: KeyGenerator<R>,
    timings: BuildTimings,
}

impl<C, R> ImageBuilder<C, R>
where
    C: CloudClient + 'static,
    R: CommandRunner + Clone + 'static,
{
    /// Creates a builder.
    #[must_use]
    pub fn new(
        client: Arc<C>,
        ui: Arc<dyn Ui>,
        provisioner: Arc<dyn Provisioner>,
        keygen: KeyGenerator<R>,
        timings: BuildTimings,
    ) -> Self {
        Self {
            client,
            ui,
            provisioner,
            keygen,
            timings,
        }
    }

    /// Names of the pipeline steps in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        StepRunner::new(self.steps()).step_names()
    }

    fn steps(&self) -> Vec<Box<dyn Step<C>>> {
        vec![
            Box::new(EnsureSshKey::new(self.keygen.clone())),
            Box::new(CreateServer::new()),
            Box::new(WaitForServer),
            Box::new(HandOffToProvisioners),
            Box::new(CaptureImage),
        ]
    }

    /// Runs the full pipeline for `request`.
    ///
    /// Temporary resources are cleaned up before this returns, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when a step halts, when cleanup fails after an
    /// otherwise successful run, or when no image was recorded.
    pub async fn build(
        &self,
        request: &ImageRequest,
    ) -> Result<ImageArtifact, BuildError<C::Error>> {
        let mut state = BuildState::new(
            Arc::clone(&self.client),
            request.clone(),
            Arc::clone(&self.ui),
            Arc::clone(&self.provisioner),
            self.timings,
        );
        let mut runner = StepRunner::new(self.steps());
        tracing::info!(image = %request.image_name, "starting image build");
        runner.run(&mut state).await?;
        state.image.ok_or(BuildError::NoArtifact)
    }
}
