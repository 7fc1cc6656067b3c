//! Cloud resource client abstraction consumed by the build steps.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::resources::{
    Action, ActionId, Datacenter, Image, Location, Server, ServerId, ServerType, SshKey, SshKeyId,
};

/// Future returned by client operations.
pub type ClientFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Parameters for creating a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerCreateOpts {
    /// Unique server name.
    pub name: String,
    /// Resolved server type.
    pub server_type: ServerType,
    /// Resolved boot image.
    pub image: Image,
    /// Keys installed for the login user.
    pub ssh_keys: Vec<SshKey>,
    /// Optional cloud-init payload.
    pub user_data: Option<String>,
    /// Optional resolved location.
    pub location: Option<Location>,
    /// Optional resolved datacenter.
    pub datacenter: Option<Datacenter>,
    /// Labels attached to the server.
    pub labels: BTreeMap<String, String>,
}

/// Result of a create-server call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerCreateResult {
    /// The new server.
    pub server: Server,
    /// Action tracking the creation, when reported.
    pub action: Option<Action>,
}

/// Parameters for creating an image from a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageCreateOpts {
    /// Description stored with the snapshot.
    pub description: String,
    /// Labels attached to the snapshot.
    pub labels: BTreeMap<String, String>,
}

/// Result of a create-image call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageCreateResult {
    /// The new snapshot.
    pub image: Image,
    /// Action tracking the snapshot, when reported.
    pub action: Option<Action>,
}

/// Parameters for registering an SSH key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshKeyCreateOpts {
    /// Key name, unique within the project.
    pub name: String,
    /// OpenSSH formatted public key.
    pub public_key: String,
    /// Labels attached to the key.
    pub labels: BTreeMap<String, String>,
}

/// Request/response interface to the cloud provider.
///
/// Lookups return `Ok(None)` when the resource does not exist; every other
/// failure is an error. Implementations must be shareable across tasks.
pub trait CloudClient: Send + Sync {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches a server by id.
    fn server_by_id(&self, id: ServerId) -> ClientFuture<'_, Option<Server>, Self::Error>;

    /// Creates a server.
    fn create_server<'a>(
        &'a self,
        opts: &'a ServerCreateOpts,
    ) -> ClientFuture<'a, ServerCreateResult, Self::Error>;

    /// Creates a snapshot image of `server`.
    fn create_image<'a>(
        &'a self,
        server: &'a Server,
        opts: &'a ImageCreateOpts,
    ) -> ClientFuture<'a, ImageCreateResult, Self::Error>;

    /// Deletes `server`, returning the tracking action when reported.
    fn delete_server<'a>(
        &'a self,
        server: &'a Server,
    ) -> ClientFuture<'a, Option<Action>, Self::Error>;

    /// Resolves a server type by numeric id or by name.
    fn server_type<'a>(
        &'a self,
        id_or_name: &'a str,
    ) -> ClientFuture<'a, Option<ServerType>, Self::Error>;

    /// Resolves an image by numeric id or by name.
    fn image<'a>(&'a self, id_or_name: &'a str) -> ClientFuture<'a, Option<Image>, Self::Error>;

    /// Fetches an SSH key by id.
    fn ssh_key_by_id(&self, id: SshKeyId) -> ClientFuture<'_, Option<SshKey>, Self::Error>;

    /// Registers an SSH public key.
    fn create_ssh_key<'a>(
        &'a self,
        opts: &'a SshKeyCreateOpts,
    ) -> ClientFuture<'a, SshKey, Self::Error>;

    /// Deletes a registered SSH key.
    fn delete_ssh_key(&self, id: SshKeyId) -> ClientFuture<'_, (), Self::Error>;

    /// Resolves a location by name.
    fn location_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> ClientFuture<'a, Option<Location>, Self::Error>;

    /// Resolves a datacenter by name.
    fn datacenter_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> ClientFuture<'a, Option<Datacenter>, Self::Error>;

    /// Fetches an action by id.
    fn action_by_id(&self, id: ActionId) -> ClientFuture<'_, Option<Action>, Self::Error>;
}
