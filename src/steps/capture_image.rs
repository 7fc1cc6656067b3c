//! Snapshots the provisioned server.

use crate::artifact::ImageArtifact;
use crate::client::{CloudClient, ImageCreateOpts};
use crate::state::BuildState;
use crate::step::{ResourceKind, Step, StepError, StepFuture, StepResult};
use crate::steps::action::wait_for_action;

/// Creates a snapshot of the server and records it as the build artifact.
///
/// Hetzner leaves snapshot names empty, so the artifact is named after the
/// configured image name unless the provider returns one.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureImage;

impl<C: CloudClient> Step<C> for CaptureImage {
    fn name(&self) -> &'static str {
        "capture-image"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState<C>) -> StepFuture<'a, StepResult<C::Error>> {
        Box::pin(async move {
            let id = state.require_server()?.id;
            let server = state
                .client
                .server_by_id(id)
                .await
                .map_err(StepError::Client)?
                .ok_or_else(|| StepError::NotFound {
                    kind: ResourceKind::Server,
                    name: id.to_string(),
                })?;

            let image_name = state.request.image_name.clone();
            state
                .ui
                .say(&format!("Creating snapshot image: {image_name}"));
            let opts = ImageCreateOpts {
                description: image_name.clone(),
                labels: state.request.snapshot_labels.clone(),
            };
            let created = state
                .client
                .create_image(&server, &opts)
                .await
                .map_err(StepError::Client)?;
            if let Some(action) = &created.action {
                wait_for_action(state, action).await?;
            }

            let name = created
                .image
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or(image_name);
            let artifact = ImageArtifact {
                id: created.image.id,
                name,
            };
            tracing::info!(image = %artifact.id, server = %id, "snapshot created");
            state
                .ui
                .say(&format!("Created image: {} ID: {}", artifact.name, artifact.id));
            state.image = Some(artifact);
            Ok(())
        })
    }
}
