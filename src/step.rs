//! The step contract shared by every stage of the build pipeline.

use std::fmt;
use std::future::{Future, ready};
use std::pin::Pin;

use thiserror::Error;

use crate::client::CloudClient;
use crate::keygen::KeygenError;
use crate::provision::ProvisionError;
use crate::resources::{ActionId, ServerId};
use crate::state::BuildState;

/// Future returned by step operations.
pub type StepFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a step's forward or compensating action.
pub type StepResult<E> = Result<(), StepError<E>>;

/// One stage of the pipeline: a forward action paired with a compensating
/// cleanup.
///
/// `run` returning `Err` halts the pipeline. `cleanup` is invoked for every
/// step whose `run` was started, including the one that halted, so it must
/// tolerate partial initialisation and repeated calls.
pub trait Step<C: CloudClient>: Send {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Performs the forward action.
    fn run<'a>(&'a mut self, state: &'a mut BuildState<C>) -> StepFuture<'a, StepResult<C::Error>>;

    /// Undoes whatever `run` left behind. The default does nothing.
    fn cleanup<'a>(
        &'a mut self,
        state: &'a mut BuildState<C>,
    ) -> StepFuture<'a, StepResult<C::Error>> {
        let _ = state;
        Box::pin(ready(Ok(())))
    }
}

/// Kinds of provider resources a step may fail to find.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// A server type.
    ServerType,
    /// An image.
    Image,
    /// An SSH key.
    SshKey,
    /// A location.
    Location,
    /// A datacenter.
    Datacenter,
    /// A server.
    Server,
    /// An action.
    Action,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ServerType => "server type",
            Self::Image => "image",
            Self::SshKey => "SSH key",
            Self::Location => "location",
            Self::Datacenter => "datacenter",
            Self::Server => "server",
            Self::Action => "action",
        };
        f.write_str(label)
    }
}

/// Errors raised by steps.
#[derive(Debug, Error, PartialEq)]
pub enum StepError<E>
where
    E: std::error::Error + 'static,
{
    /// A provider call failed.
    #[error(transparent)]
    Client(E),
    /// A named resource does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of resource looked up.
        kind: ResourceKind,
        /// Id or name used for the lookup.
        name: String,
    },
    /// A step ran before the step producing its input.
    #[error("build state is missing {entry}")]
    MissingState {
        /// Name of the missing entry.
        entry: &'static str,
    },
    /// Temporary key generation failed.
    #[error("SSH key generation failed: {0}")]
    Keygen(#[from] KeygenError),
    /// The provisioner failed.
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
    /// A provider action finished with an error.
    #[error("action {action} ({command}) failed: {message}")]
    ActionFailed {
        /// Action identifier.
        action: ActionId,
        /// Action command.
        command: String,
        /// Error reported by the provider.
        message: String,
    },
    /// A wait loop exceeded the configured timeout.
    #[error("timeout waiting for {waiting_for} on {resource}")]
    Timeout {
        /// What was awaited.
        waiting_for: String,
        /// Resource being observed.
        resource: String,
    },
    /// The server reached `running` but never exposed a public IPv4.
    #[error("server {server_id} has no public IPv4 address")]
    MissingPublicIp {
        /// Server identifier.
        server_id: ServerId,
    },
    /// The server was still listed after deletion.
    #[error("server {server_id} still present after deletion")]
    ResidualServer {
        /// Server identifier.
        server_id: ServerId,
    },
}
