//! Sequential step runner with reverse-order compensation.
//!
//! Steps run one at a time. The first error halts forward progress; then,
//! whether the sequence completed or halted, every started step is cleaned
//! up in reverse order. Cleanup failures are reported but never replace a
//! forward error.

use thiserror::Error;

use crate::client::CloudClient;
use crate::state::BuildState;
use crate::step::{Step, StepError};

/// Terminal failure of a pipeline run.
#[derive(Debug, Error, PartialEq)]
pub enum BuildError<E>
where
    E: std::error::Error + 'static,
{
    /// A step halted the pipeline.
    #[error("{step} failed: {source}")]
    Step {
        /// Name of the halting step.
        step: &'static str,
        /// The halting error.
        #[source]
        source: StepError<E>,
    },
    /// The forward sequence succeeded but a cleanup failed.
    #[error("cleanup of {step} failed: {source}")]
    Cleanup {
        /// Name of the step whose cleanup failed.
        step: &'static str,
        /// The cleanup error.
        #[source]
        source: StepError<E>,
    },
    /// The sequence completed without recording an image.
    #[error("build finished without producing an image")]
    NoArtifact,
}

/// Ordered list of steps executed against one [`BuildState`].
pub struct StepRunner<C: CloudClient> {
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C: CloudClient> StepRunner<C> {
    /// Creates a runner over `steps`, executed in the given order.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step<C>>>) -> Self {
        Self { steps }
    }

    /// Names of the steps in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Runs every step, then unwinds.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Step`] for the first halting step, or
    /// [`BuildError::Cleanup`] for the first failed cleanup when no step
    /// halted.
    pub async fn run(&mut self, state: &mut BuildState<C>) -> Result<(), BuildError<C::Error>> {
        let mut started = 0;
        let mut halt = None;

        for step in &mut self.steps {
            started += 1;
            tracing::debug!(step = step.name(), "running step");
            if let Err(err) = step.run(state).await {
                state.ui.error(&err.to_string());
                tracing::warn!(step = step.name(), error = %err, "step halted the build");
                halt = Some(BuildError::Step {
                    step: step.name(),
                    source: err,
                });
                break;
            }
        }

        let cleanup_failure = self.unwind(state, started).await;

        match (halt, cleanup_failure) {
            (Some(err), _) | (None, Some(err)) => Err(err),
            (None, None) => Ok(()),
        }
    }

    async fn unwind(
        &mut self,
        state: &mut BuildState<C>,
        started: usize,
    ) -> Option<BuildError<C::Error>> {
        let mut first_failure = None;
        for step in self.steps.iter_mut().take(started).rev() {
            tracing::debug!(step = step.name(), "cleaning up step");
            if let Err(err) = step.cleanup(state).await {
                state.ui.error(&format!(
                    "{err} (manual cleanup of cloud resources may be required)"
                ));
                tracing::warn!(step = step.name(), error = %err, "cleanup failed");
                if first_failure.is_none() {
                    first_failure = Some(BuildError::Cleanup {
                        step: step.name(),
                        source: err,
                    });
                }
            }
        }
        first_failure
    }
}
