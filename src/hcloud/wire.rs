//! JSON payloads exchanged with the Hetzner Cloud API and their conversion
//! into provider-neutral resources.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resources::{
    Action, ActionError, ActionId, ActionStatus, Datacenter, DatacenterId, Image, ImageId,
    ImageKind, Location, LocationId, Server, ServerId, ServerStatus, ServerType, ServerTypeId,
    SshKey, SshKeyId,
};

/// Reference to a resource by numeric id or by name.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub(super) enum IdOrName {
    Id(u64),
    Name(String),
}

#[derive(Debug, Serialize)]
pub(super) struct CreateServerRequest {
    pub(super) name: String,
    pub(super) server_type: IdOrName,
    pub(super) image: IdOrName,
    pub(super) ssh_keys: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) user_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) location: Option<IdOrName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) datacenter: Option<IdOrName>,
    pub(super) start_after_create: bool,
    pub(super) labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateImageRequest {
    pub(super) description: String,
    #[serde(rename = "type")]
    pub(super) kind: &'static str,
    pub(super) labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSshKeyRequest {
    pub(super) name: String,
    pub(super) public_key: String,
    pub(super) labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorEnvelope {
    pub(super) error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorBody {
    pub(super) code: String,
    pub(super) message: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireIpv4 {
    ip: String,
}

#[derive(Debug, Default, Deserialize)]
struct WirePublicNet {
    #[serde(default)]
    ipv4: Option<WireIpv4>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireServer {
    id: u64,
    name: String,
    status: String,
    #[serde(default)]
    public_net: WirePublicNet,
}

impl From<WireServer> for Server {
    fn from(value: WireServer) -> Self {
        let public_ipv4 = value
            .public_net
            .ipv4
            .and_then(|ipv4| IpAddr::from_str(&ipv4.ip).ok());
        Self {
            id: ServerId::new(value.id),
            name: value.name,
            status: ServerStatus::from_wire(&value.status),
            public_ipv4,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireServerType {
    id: u64,
    name: String,
}

impl From<WireServerType> for ServerType {
    fn from(value: WireServerType) -> Self {
        Self {
            id: ServerTypeId::new(value.id),
            name: value.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireImage {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    kind: String,
}

impl From<WireImage> for Image {
    fn from(value: WireImage) -> Self {
        Self {
            id: ImageId::new(value.id),
            name: value.name,
            description: value.description,
            kind: ImageKind::from_wire(&value.kind),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireSshKey {
    id: u64,
    name: String,
    #[serde(default)]
    fingerprint: String,
}

impl From<WireSshKey> for SshKey {
    fn from(value: WireSshKey) -> Self {
        Self {
            id: SshKeyId::new(value.id),
            name: value.name,
            fingerprint: value.fingerprint,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireNamed {
    id: u64,
    name: String,
}

impl From<WireNamed> for Location {
    fn from(value: WireNamed) -> Self {
        Self {
            id: LocationId::new(value.id),
            name: value.name,
        }
    }
}

impl From<WireNamed> for Datacenter {
    fn from(value: WireNamed) -> Self {
        Self {
            id: DatacenterId::new(value.id),
            name: value.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireActionError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireAction {
    id: u64,
    command: String,
    status: String,
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    error: Option<WireActionError>,
}

impl From<WireAction> for Action {
    fn from(value: WireAction) -> Self {
        let status = match value.status.as_str() {
            "success" => ActionStatus::Success,
            "error" => ActionStatus::Error,
            _ => ActionStatus::Running,
        };
        Self {
            id: ActionId::new(value.id),
            command: value.command,
            status,
            progress: value.progress,
            error: value.error.map(|err| ActionError {
                code: err.code,
                message: err.message,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: WireServer,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateServerResponse {
    pub(super) server: WireServer,
    #[serde(default)]
    pub(super) action: Option<WireAction>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateImageResponse {
    pub(super) image: WireImage,
    #[serde(default)]
    pub(super) action: Option<WireAction>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ActionEnvelope {
    #[serde(default)]
    pub(super) action: Option<WireAction>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerTypeEnvelope {
    pub(super) server_type: WireServerType,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerTypesEnvelope {
    pub(super) server_types: Vec<WireServerType>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageEnvelope {
    pub(super) image: WireImage,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImagesEnvelope {
    pub(super) images: Vec<WireImage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SshKeyEnvelope {
    pub(super) ssh_key: WireSshKey,
}

#[derive(Debug, Deserialize)]
pub(super) struct LocationsEnvelope {
    pub(super) locations: Vec<WireNamed>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DatacentersEnvelope {
    pub(super) datacenters: Vec<WireNamed>,
}
