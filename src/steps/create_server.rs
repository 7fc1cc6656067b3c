//! Launches the temporary server and deletes it again on cleanup.

use tokio::time::sleep;

use crate::client::{CloudClient, ServerCreateOpts};
use crate::naming::server_name;
use crate::resources::{Server, ServerId};
use crate::state::BuildState;
use crate::step::{ResourceKind, Step, StepError, StepFuture, StepResult};
use crate::steps::action::wait_for_action;

/// Resolves the requested resources and creates the build server.
///
/// The created id is remembered so cleanup can delete exactly that server.
/// Cleanup consumes the id; calling it again, or after a failed creation,
/// does nothing.
#[derive(Debug, Default)]
pub struct CreateServer {
    server_id: Option<ServerId>,
}

impl CreateServer {
    /// Creates the step with no server recorded.
    #[must_use]
    pub const fn new() -> Self {
        Self { server_id: None }
    }

    /// Id of the server this step created and has not yet cleaned up.
    #[must_use]
    pub const fn server_id(&self) -> Option<ServerId> {
        self.server_id
    }

    async fn resolve<C: CloudClient>(
        state: &BuildState<C>,
    ) -> Result<ServerCreateOpts, StepError<C::Error>> {
        let request = &state.request;
        let client = &state.client;

        let server_type = client
            .server_type(&request.server_type)
            .await
            .map_err(StepError::Client)?
            .ok_or_else(|| not_found(ResourceKind::ServerType, &request.server_type))?;
        let image = client
            .image(&request.source_image)
            .await
            .map_err(StepError::Client)?
            .ok_or_else(|| not_found(ResourceKind::Image, &request.source_image))?;

        let key_id = state.require_ssh_key()?.key_id;
        let ssh_key = client
            .ssh_key_by_id(key_id)
            .await
            .map_err(StepError::Client)?
            .ok_or_else(|| not_found(ResourceKind::SshKey, &key_id.to_string()))?;

        let location = match request.location.as_deref() {
            Some(name) => Some(
                client
                    .location_by_name(name)
                    .await
                    .map_err(StepError::Client)?
                    .ok_or_else(|| not_found(ResourceKind::Location, name))?,
            ),
            None => None,
        };
        let datacenter = match request.datacenter.as_deref() {
            Some(name) => Some(
                client
                    .datacenter_by_name(name)
                    .await
                    .map_err(StepError::Client)?
                    .ok_or_else(|| not_found(ResourceKind::Datacenter, name))?,
            ),
            None => None,
        };

        Ok(ServerCreateOpts {
            name: server_name(),
            server_type,
            image,
            ssh_keys: vec![ssh_key],
            user_data: request.user_data.clone(),
            location,
            datacenter,
            labels: request.snapshot_labels.clone(),
        })
    }

    async fn destroy<C: CloudClient>(
        state: &BuildState<C>,
        id: ServerId,
    ) -> StepResult<C::Error> {
        state.ui.say(&format!("Destroying server {id}..."));
        let Some(server) = state
            .client
            .server_by_id(id)
            .await
            .map_err(StepError::Client)?
        else {
            tracing::debug!(server = %id, "server already gone");
            return Ok(());
        };

        if let Some(action) = state
            .client
            .delete_server(&server)
            .await
            .map_err(StepError::Client)?
        {
            wait_for_action(state, &action).await?;
        }
        wait_until_gone(state, &server).await
    }
}

fn not_found<E: std::error::Error + 'static>(kind: ResourceKind, name: &str) -> StepError<E> {
    StepError::NotFound {
        kind,
        name: name.to_owned(),
    }
}

async fn wait_until_gone<C: CloudClient>(
    state: &BuildState<C>,
    server: &Server,
) -> StepResult<C::Error> {
    let deadline = state.timings.deadline();
    while !deadline.has_passed() {
        if state
            .client
            .server_by_id(server.id)
            .await
            .map_err(StepError::Client)?
            .is_none()
        {
            return Ok(());
        }
        sleep(state.timings.poll_interval).await;
    }

    Err(StepError::ResidualServer {
        server_id: server.id,
    })
}

impl<C: CloudClient> Step<C> for CreateServer {
    fn name(&self) -> &'static str {
        "create-server"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState<C>) -> StepFuture<'a, StepResult<C::Error>> {
        Box::pin(async move {
            let opts = Self::resolve(state).await?;
            state
                .ui
                .say(&format!("Creating new server: {}", opts.name));
            let created = state
                .client
                .create_server(&opts)
                .await
                .map_err(StepError::Client)?;

            let id = created.server.id;
            if !id.is_unset() {
                self.server_id = Some(id);
            }
            tracing::info!(server = %id, name = %created.server.name, "server created");
            state.server = Some(created.server);
            state.ui.say(&format!("Created server {id}"));
            Ok(())
        })
    }

    fn cleanup<'a>(
        &'a mut self,
        state: &'a mut BuildState<C>,
    ) -> StepFuture<'a, StepResult<C::Error>> {
        Box::pin(async move {
            let Some(id) = self.server_id.take() else {
                return Ok(());
            };
            Self::destroy(state, id).await
        })
    }
}
