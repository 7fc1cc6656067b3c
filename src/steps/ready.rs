//! Waiting for the server to accept connections, then handing it to the
//! provisioner.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::client::CloudClient;
use crate::provision::Connection;
use crate::resources::{ServerId, ServerStatus};
use crate::state::BuildState;
use crate::step::{ResourceKind, Step, StepError, StepFuture, StepResult};

/// Port provisioners connect to.
pub const SSH_PORT: u16 = 22;

const PROBE_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls the created server until it is running with a public IPv4
/// address, then records the connection details.
#[derive(Clone, Copy, Debug, Default)]
pub struct WaitForServer;

impl WaitForServer {
    async fn wait_for_public_ip<C: CloudClient>(
        state: &BuildState<C>,
        id: ServerId,
    ) -> Result<IpAddr, StepError<C::Error>> {
        let deadline = state.timings.deadline();
        let mut running_without_ip = false;
        loop {
            let server = state
                .client
                .server_by_id(id)
                .await
                .map_err(StepError::Client)?
                .ok_or_else(|| StepError::NotFound {
                    kind: ResourceKind::Server,
                    name: id.to_string(),
                })?;

            if server.status == ServerStatus::Running {
                if let Some(address) = server.public_ipv4 {
                    return Ok(address);
                }
                running_without_ip = true;
            }

            if deadline.has_passed() {
                return Err(if running_without_ip {
                    StepError::MissingPublicIp { server_id: id }
                } else {
                    StepError::Timeout {
                        waiting_for: String::from("running state"),
                        resource: format!("server {id}"),
                    }
                });
            }
            tracing::debug!(server = %id, status = ?server.status, "waiting for server");
            sleep(state.timings.poll_interval).await;
        }
    }

    async fn probe_ssh<C: CloudClient>(
        state: &BuildState<C>,
        address: SocketAddr,
    ) -> StepResult<C::Error> {
        let deadline = state.timings.deadline();
        loop {
            let attempt = state.timings.wait_timeout.min(PROBE_ATTEMPT_TIMEOUT);
            if let Ok(Ok(_stream)) = timeout(attempt, TcpStream::connect(address)).await {
                return Ok(());
            }
            if deadline.has_passed() {
                return Err(StepError::Timeout {
                    waiting_for: String::from("SSH port"),
                    resource: address.to_string(),
                });
            }
            sleep(state.timings.poll_interval).await;
        }
    }
}

impl<C: CloudClient> Step<C> for WaitForServer {
    fn name(&self) -> &'static str {
        "wait-for-server"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState<C>) -> StepFuture<'a, StepResult<C::Error>> {
        Box::pin(async move {
            let id = state.require_server()?.id;
            state.ui.say("Waiting for server to become available...");
            let host = Self::wait_for_public_ip(state, id).await?;

            if state.timings.ssh_probe {
                Self::probe_ssh(state, SocketAddr::new(host, SSH_PORT)).await?;
            }

            let private_key = state
                .ssh_key
                .as_ref()
                .and_then(|key| key.private_key.clone());
            state.connection = Some(Connection {
                host,
                port: SSH_PORT,
                username: state.request.ssh_username.clone(),
                private_key,
            });
            tracing::info!(server = %id, %host, "server ready");
            Ok(())
        })
    }
}

/// Passes the ready server to the configured provisioner.
#[derive(Clone, Copy, Debug, Default)]
pub struct HandOffToProvisioners;

impl<C: CloudClient> Step<C> for HandOffToProvisioners {
    fn name(&self) -> &'static str {
        "provision"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState<C>) -> StepFuture<'a, StepResult<C::Error>> {
        Box::pin(async move {
            let connection = state.require_connection()?;
            state
                .provisioner
                .provision(connection, state.ui.as_ref())
                .await?;
            Ok(())
        })
    }
}
