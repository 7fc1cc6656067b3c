//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedClient`] is an in-memory provider that records every call and
//! can be told to fail individual operations or to hide resources.
//! [`RecordingUi`] captures pipeline output and [`ScriptedRunner`] returns
//! pre-seeded command outcomes without spawning processes.

use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::future::ready;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::client::{
    ClientFuture, CloudClient, ImageCreateOpts, ImageCreateResult, ServerCreateOpts,
    ServerCreateResult, SshKeyCreateOpts,
};
use crate::command::{CommandOutput, CommandRunner, SpawnError};
use crate::provision::ReportingProvisioner;
use crate::request::ImageRequest;
use crate::resources::{
    Action, ActionId, ActionStatus, Datacenter, DatacenterId, Image, ImageId, ImageKind, Location,
    LocationId, Server, ServerId, ServerStatus, ServerType, ServerTypeId, SshKey, SshKeyId,
};
use crate::state::{BuildState, BuildTimings};
use crate::step::ResourceKind;
use crate::ui::Ui;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Operation-specific failure returned by [`ScriptedClient`].
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ScriptedClientError {
    /// `server_by_id` failed.
    #[error("scripted server lookup failure")]
    ServerById,
    /// `create_server` failed.
    #[error("scripted create-server failure")]
    CreateServer,
    /// `create_image` failed.
    #[error("scripted create-image failure")]
    CreateImage,
    /// `delete_server` failed.
    #[error("scripted delete-server failure")]
    DeleteServer,
    /// `server_type` failed.
    #[error("scripted server type lookup failure")]
    ServerType,
    /// `image` failed.
    #[error("scripted image lookup failure")]
    Image,
    /// `create_ssh_key` failed.
    #[error("scripted create-ssh-key failure")]
    CreateSshKey,
    /// `delete_ssh_key` failed.
    #[error("scripted delete-ssh-key failure")]
    DeleteSshKey,
}

/// A call observed by [`ScriptedClient`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientCall {
    /// `server_by_id`.
    ServerById(ServerId),
    /// `create_server`.
    CreateServer(ServerCreateOpts),
    /// `create_image`.
    CreateImage {
        /// Server being imaged.
        server: ServerId,
        /// Snapshot options.
        opts: ImageCreateOpts,
    },
    /// `delete_server`.
    DeleteServer(ServerId),
    /// `server_type`.
    ServerType(String),
    /// `image`.
    Image(String),
    /// `ssh_key_by_id`.
    SshKeyById(SshKeyId),
    /// `create_ssh_key`.
    CreateSshKey,
    /// `delete_ssh_key`.
    DeleteSshKey(SshKeyId),
    /// `location_by_name`.
    Location(String),
    /// `datacenter_by_name`.
    Datacenter(String),
    /// `action_by_id`.
    ActionById(ActionId),
}

#[derive(Debug, Default)]
struct ClientScript {
    calls: Vec<ClientCall>,
    failures: Vec<ScriptedClientError>,
    missing: Vec<ResourceKind>,
    servers: BTreeMap<ServerId, Server>,
    ssh_keys: BTreeMap<SshKeyId, SshKey>,
    server_statuses: VecDeque<ServerStatus>,
    action_statuses: VecDeque<ActionStatus>,
    without_public_ip: bool,
    keep_deleted_servers: bool,
    unset_created_ids: bool,
    created_ids: Vec<ServerId>,
    next_id: u64,
}

impl ClientScript {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn check(&self, operation: ScriptedClientError) -> Result<(), ScriptedClientError> {
        if self.failures.contains(&operation) {
            return Err(operation);
        }
        Ok(())
    }

    fn hides(&self, kind: ResourceKind) -> bool {
        self.missing.contains(&kind)
    }

    fn finished_action(&mut self, command: &str) -> Action {
        Action {
            id: ActionId::new(self.allocate_id()),
            command: command.to_owned(),
            status: ActionStatus::Success,
            progress: 100,
            error: None,
        }
    }

    fn insert_server(&mut self, name: String) -> Server {
        let server = Server {
            id: ServerId::new(self.allocate_id()),
            name,
            status: ServerStatus::Initializing,
            public_ipv4: None,
        };
        self.servers.insert(server.id, server.clone());
        server
    }
}

/// In-memory cloud provider recording every call.
///
/// Lookups of server types, images, locations and datacenters succeed for
/// any name unless the kind was hidden with [`ScriptedClient::missing`].
/// Servers report `running` with [`ScriptedClient::PUBLIC_IPV4`] unless
/// statuses were queued.
#[derive(Clone, Debug, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<ClientScript>>,
}

impl ScriptedClient {
    /// SSH key id that always exists.
    pub const EXISTING_SSH_KEY_ID: u64 = 77;

    /// Address reported for running servers.
    pub const PUBLIC_IPV4: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 10);

    /// Creates a healthy client.
    #[must_use]
    pub fn new() -> Self {
        let client = Self::default();
        lock(&client.script).ssh_keys.insert(
            SshKeyId::new(Self::EXISTING_SSH_KEY_ID),
            SshKey {
                id: SshKeyId::new(Self::EXISTING_SSH_KEY_ID),
                name: String::from("operator"),
                fingerprint: String::from("aa:bb:cc"),
            },
        );
        client
    }

    /// Makes `operation` fail from now on.
    pub fn fail_on(&self, operation: ScriptedClientError) {
        lock(&self.script).failures.push(operation);
    }

    /// Makes lookups of `kind` return nothing.
    pub fn missing(&self, kind: ResourceKind) {
        lock(&self.script).missing.push(kind);
    }

    /// Queues statuses returned by successive server lookups.
    pub fn queue_server_statuses(&self, statuses: impl IntoIterator<Item = ServerStatus>) {
        lock(&self.script).server_statuses.extend(statuses);
    }

    /// Queues statuses returned by successive action lookups.
    pub fn queue_action_statuses(&self, statuses: impl IntoIterator<Item = ActionStatus>) {
        lock(&self.script).action_statuses.extend(statuses);
    }

    /// Running servers report no public address.
    pub fn without_public_ip(&self) {
        lock(&self.script).without_public_ip = true;
    }

    /// Deleted servers stay listed.
    pub fn keep_deleted_servers(&self) {
        lock(&self.script).keep_deleted_servers = true;
    }

    /// Server creation answers with an unset (zero) id.
    pub fn create_with_unset_id(&self) {
        lock(&self.script).unset_created_ids = true;
    }

    /// Drops every server as if deleted out of band.
    pub fn forget_servers(&self) {
        lock(&self.script).servers.clear();
    }

    /// Registers a server without recording a call.
    #[must_use]
    pub fn spawn_server(&self) -> Server {
        lock(&self.script).insert_server(String::from("hcloud-imager-test"))
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ClientCall> {
        lock(&self.script).calls.clone()
    }

    /// Options of every `create_server` call.
    #[must_use]
    pub fn created_servers(&self) -> Vec<ServerCreateOpts> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ClientCall::CreateServer(opts) => Some(opts),
                _ => None,
            })
            .collect()
    }

    /// Ids returned by every successful `create_server` call.
    #[must_use]
    pub fn created_server_ids(&self) -> Vec<ServerId> {
        lock(&self.script).created_ids.clone()
    }

    /// Options of every `create_image` call.
    #[must_use]
    pub fn created_images(&self) -> Vec<ImageCreateOpts> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ClientCall::CreateImage { opts, .. } => Some(opts),
                _ => None,
            })
            .collect()
    }

    /// Ids passed to every `delete_server` call.
    #[must_use]
    pub fn deleted_servers(&self) -> Vec<ServerId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ClientCall::DeleteServer(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn respond<T>(
        &self,
        call: ClientCall,
        operation: Option<ScriptedClientError>,
        body: impl FnOnce(&mut ClientScript) -> T,
    ) -> ClientFuture<'_, T, ScriptedClientError>
    where
        T: Send + 'static,
    {
        let mut script = lock(&self.script);
        script.calls.push(call);
        let result = match operation {
            Some(op) => script.check(op).map(|()| body(&mut *script)),
            None => Ok(body(&mut *script)),
        };
        Box::pin(ready(result))
    }
}

impl CloudClient for ScriptedClient {
    type Error = ScriptedClientError;

    fn server_by_id(&self, id: ServerId) -> ClientFuture<'_, Option<Server>, Self::Error> {
        self.respond(
            ClientCall::ServerById(id),
            Some(ScriptedClientError::ServerById),
            |script| {
                let status = script.server_statuses.pop_front();
                let without_ip = script.without_public_ip;
                let server = script.servers.get_mut(&id)?;
                server.status = status.unwrap_or(ServerStatus::Running);
                server.public_ipv4 = (server.status == ServerStatus::Running && !without_ip)
                    .then_some(IpAddr::V4(Self::PUBLIC_IPV4));
                Some(server.clone())
            },
        )
    }

    fn create_server<'a>(
        &'a self,
        opts: &'a ServerCreateOpts,
    ) -> ClientFuture<'a, ServerCreateResult, Self::Error> {
        self.respond(
            ClientCall::CreateServer(opts.clone()),
            Some(ScriptedClientError::CreateServer),
            |script| {
                let mut server = script.insert_server(opts.name.clone());
                if script.unset_created_ids {
                    script.servers.remove(&server.id);
                    server.id = ServerId::new(0);
                }
                script.created_ids.push(server.id);
                let action = script.finished_action("create_server");
                ServerCreateResult {
                    server,
                    action: Some(action),
                }
            },
        )
    }

    fn create_image<'a>(
        &'a self,
        server: &'a Server,
        opts: &'a ImageCreateOpts,
    ) -> ClientFuture<'a, ImageCreateResult, Self::Error> {
        self.respond(
            ClientCall::CreateImage {
                server: server.id,
                opts: opts.clone(),
            },
            Some(ScriptedClientError::CreateImage),
            |script| {
                let image = Image {
                    id: ImageId::new(script.allocate_id()),
                    name: None,
                    description: opts.description.clone(),
                    kind: ImageKind::Snapshot,
                };
                let action = script.finished_action("create_image");
                ImageCreateResult {
                    image,
                    action: Some(action),
                }
            },
        )
    }

    fn delete_server<'a>(
        &'a self,
        server: &'a Server,
    ) -> ClientFuture<'a, Option<Action>, Self::Error> {
        self.respond(
            ClientCall::DeleteServer(server.id),
            Some(ScriptedClientError::DeleteServer),
            |script| {
                if !script.keep_deleted_servers {
                    script.servers.remove(&server.id);
                }
                Some(script.finished_action("delete_server"))
            },
        )
    }

    fn server_type<'a>(
        &'a self,
        id_or_name: &'a str,
    ) -> ClientFuture<'a, Option<ServerType>, Self::Error> {
        self.respond(
            ClientCall::ServerType(id_or_name.to_owned()),
            Some(ScriptedClientError::ServerType),
            |script| {
                (!script.hides(ResourceKind::ServerType)).then(|| ServerType {
                    id: ServerTypeId::new(1),
                    name: id_or_name.to_owned(),
                })
            },
        )
    }

    fn image<'a>(&'a self, id_or_name: &'a str) -> ClientFuture<'a, Option<Image>, Self::Error> {
        self.respond(
            ClientCall::Image(id_or_name.to_owned()),
            Some(ScriptedClientError::Image),
            |script| {
                (!script.hides(ResourceKind::Image)).then(|| Image {
                    id: ImageId::new(2),
                    name: Some(id_or_name.to_owned()),
                    description: id_or_name.to_owned(),
                    kind: ImageKind::System,
                })
            },
        )
    }

    fn ssh_key_by_id(&self, id: SshKeyId) -> ClientFuture<'_, Option<SshKey>, Self::Error> {
        self.respond(ClientCall::SshKeyById(id), None, |script| {
            if script.hides(ResourceKind::SshKey) {
                return None;
            }
            script.ssh_keys.get(&id).cloned()
        })
    }

    fn create_ssh_key<'a>(
        &'a self,
        opts: &'a SshKeyCreateOpts,
    ) -> ClientFuture<'a, SshKey, Self::Error> {
        self.respond(
            ClientCall::CreateSshKey,
            Some(ScriptedClientError::CreateSshKey),
            |script| {
                let key = SshKey {
                    id: SshKeyId::new(script.allocate_id()),
                    name: opts.name.clone(),
                    fingerprint: String::from("de:ad:be:ef"),
                };
                script.ssh_keys.insert(key.id, key.clone());
                key
            },
        )
    }

    fn delete_ssh_key(&self, id: SshKeyId) -> ClientFuture<'_, (), Self::Error> {
        self.respond(
            ClientCall::DeleteSshKey(id),
            Some(ScriptedClientError::DeleteSshKey),
            |script| {
                script.ssh_keys.remove(&id);
            },
        )
    }

    fn location_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> ClientFuture<'a, Option<Location>, Self::Error> {
        self.respond(ClientCall::Location(name.to_owned()), None, |script| {
            (!script.hides(ResourceKind::Location)).then(|| Location {
                id: LocationId::new(3),
                name: name.to_owned(),
            })
        })
    }

    fn datacenter_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> ClientFuture<'a, Option<Datacenter>, Self::Error> {
        self.respond(ClientCall::Datacenter(name.to_owned()), None, |script| {
            (!script.hides(ResourceKind::Datacenter)).then(|| Datacenter {
                id: DatacenterId::new(4),
                name: name.to_owned(),
            })
        })
    }

    fn action_by_id(&self, id: ActionId) -> ClientFuture<'_, Option<Action>, Self::Error> {
        self.respond(ClientCall::ActionById(id), None, |script| {
            let status = script
                .action_statuses
                .pop_front()
                .unwrap_or(ActionStatus::Success);
            Some(Action {
                id,
                command: String::from("scripted"),
                status,
                progress: if status == ActionStatus::Running { 50 } else { 100 },
                error: None,
            })
        })
    }
}

/// UI sink that keeps every message for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingUi {
    said: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl RecordingUi {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress messages received so far.
    #[must_use]
    pub fn said(&self) -> Vec<String> {
        lock(&self.said).clone()
    }

    /// Error messages received so far.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        lock(&self.said).push(message.to_owned());
    }

    fn error(&self, message: &str) {
        lock(&self.errors).push(message.to_owned());
    }
}

#[derive(Clone, Debug)]
enum ScriptedResponse {
    Output(CommandOutput),
    Keygen { public_key: String },
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    fn key_file(&self) -> Option<&OsString> {
        let position = self.args.iter().position(|arg| arg == "-f")?;
        self.args.get(position + 1)
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_exit_code(0);
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(code, "");
    }

    /// Pushes a run that prints `stdout` and `stderr` before exiting with
    /// `code`.
    pub fn push_printed(&self, code: i32, stdout: &str, stderr: &str) {
        lock(&self.responses).push_back(ScriptedResponse::Output(CommandOutput {
            code: Some(code),
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
        }));
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: &str) {
        self.push_output(code, stderr);
    }

    /// Pushes a successful `ssh-keygen` run that writes the key files named
    /// by its `-f` argument.
    pub fn push_keygen_success(&self, public_key: &str) {
        lock(&self.responses).push_back(ScriptedResponse::Keygen {
            public_key: public_key.to_owned(),
        });
    }

    fn push_output(&self, code: i32, stderr: &str) {
        self.push_printed(code, "", stderr);
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        let invocation = CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        };
        lock(&self.invocations).push(invocation.clone());

        let spawn_error = |message: String| SpawnError {
            program: program.to_owned(),
            message,
        };
        match lock(&self.responses).pop_front() {
            Some(ScriptedResponse::Output(output)) => Ok(output),
            Some(ScriptedResponse::Keygen { public_key }) => {
                let private_key = invocation
                    .key_file()
                    .ok_or_else(|| spawn_error(String::from("missing -f argument")))?;
                let mut public_path = private_key.clone();
                public_path.push(".pub");
                fs::write(private_key, "PRIVATE KEY")
                    .and_then(|()| fs::write(public_path, format!("{public_key}\n")))
                    .map_err(|err| spawn_error(err.to_string()))?;
                Ok(CommandOutput {
                    code: Some(0),
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            None => Err(spawn_error(String::from("no scripted response"))),
        }
    }
}

/// Timings that keep polling loops short in tests.
#[must_use]
pub const fn fast_timings() -> BuildTimings {
    BuildTimings {
        poll_interval: Duration::from_millis(1),
        wait_timeout: Duration::from_millis(100),
        ssh_probe: false,
    }
}

/// Builds a run context over `client` with fast timings and a reporting
/// provisioner.
#[must_use]
pub fn build_state(
    client: ScriptedClient,
    request: ImageRequest,
    ui: RecordingUi,
) -> BuildState<ScriptedClient> {
    BuildState::new(
        Arc::new(client),
        request,
        Arc::new(ui),
        Arc::new(ReportingProvisioner),
        fast_timings(),
    )
}

/// The canonical request: `cx11`, `ubuntu-20.04`, image `my-image`.
///
/// # Panics
///
/// Panics if [`ImageRequest::builder`] rejects these values, which means
/// the request validation rules changed.
#[must_use]
pub fn sample_request() -> ImageRequest {
    ImageRequest::builder()
        .server_type("cx11")
        .source_image("ubuntu-20.04")
        .image_name("my-image")
        .build()
        .unwrap_or_else(|err| panic!("sample request is valid: {err}"))
}
