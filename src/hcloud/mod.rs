//! Hetzner Cloud implementation of [`CloudClient`].
//!
//! Requests go straight to the public REST API with a bearer token. A
//! `404` on a lookup means the resource does not exist and becomes
//! `Ok(None)`; every other non-success status is decoded from the API's
//! `{"error": {"code", "message"}}` body into [`HcloudError::Api`].

mod error;
mod wire;

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use error::HcloudError;
use wire::{
    ActionEnvelope, ApiErrorEnvelope, CreateImageRequest, CreateImageResponse,
    CreateServerRequest, CreateServerResponse, CreateSshKeyRequest, DatacentersEnvelope, IdOrName,
    ImageEnvelope, ImagesEnvelope, LocationsEnvelope, ServerEnvelope, ServerTypeEnvelope,
    ServerTypesEnvelope, SshKeyEnvelope,
};

use crate::client::{
    ClientFuture, CloudClient, ImageCreateOpts, ImageCreateResult, ServerCreateOpts,
    ServerCreateResult, SshKeyCreateOpts,
};
use crate::resources::{
    Action, ActionId, Datacenter, Image, Location, Server, ServerId, ServerType, SshKey, SshKeyId,
};

const USER_AGENT: &str = concat!("hcloud-imager/", env!("CARGO_PKG_VERSION"));

struct RawResponse {
    status: StatusCode,
    body: Vec<u8>,
}

/// Client for the Hetzner Cloud API.
#[derive(Clone, Debug)]
pub struct HcloudClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HcloudClient {
    /// Creates a client for `endpoint` authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`HcloudError::Config`] when the token or endpoint is blank or
    /// the HTTP client cannot be built.
    pub fn new(
        token: &str,
        endpoint: &str,
        request_timeout: Duration,
    ) -> Result<Self, HcloudError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(HcloudError::Config(String::from("API token is empty")));
        }
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(HcloudError::Config(String::from("API endpoint is empty")));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| HcloudError::Config(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_owned(),
            token: token.to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<RawResponse, HcloudError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        tracing::debug!(status = status.as_u16(), "hcloud response");
        Ok(RawResponse { status, body })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &'static str,
    ) -> Result<Option<T>, HcloudError> {
        let raw = self
            .send(self.request(Method::GET, path).query(query))
            .await?;
        if raw.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(&raw, context).map(Some)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        context: &'static str,
    ) -> Result<T, HcloudError> {
        let raw = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        decode(&raw, context)
    }

    async fn delete(&self, path: &str) -> Result<Option<RawResponse>, HcloudError> {
        let raw = self.send(self.request(Method::DELETE, path)).await?;
        if raw.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !raw.status.is_success() {
            return Err(api_error(raw.status, &raw.body));
        }
        Ok(Some(raw))
    }

    /// Fetches a resource by numeric id, or the first match for a name.
    async fn lookup<One, Many, T>(
        &self,
        collection: &str,
        id_or_name: &str,
        context: &'static str,
        single: impl FnOnce(One) -> T,
        first: impl FnOnce(Many) -> Option<T>,
    ) -> Result<Option<T>, HcloudError>
    where
        One: DeserializeOwned,
        Many: DeserializeOwned,
    {
        match parse_id(id_or_name) {
            Some(id) => Ok(self
                .get::<One>(&format!("{collection}/{id}"), &[], context)
                .await?
                .map(single)),
            None => Ok(self
                .get::<Many>(collection, &[("name", id_or_name)], context)
                .await?
                .and_then(first)),
        }
    }
}

fn parse_id(id_or_name: &str) -> Option<u64> {
    id_or_name.parse::<u64>().ok().filter(|id| *id != 0)
}

fn decode<T: DeserializeOwned>(raw: &RawResponse, context: &'static str) -> Result<T, HcloudError> {
    if !raw.status.is_success() {
        return Err(api_error(raw.status, &raw.body));
    }
    serde_json::from_slice(&raw.body).map_err(|err| HcloudError::Decode {
        context,
        message: err.to_string(),
    })
}

fn api_error(status: StatusCode, body: &[u8]) -> HcloudError {
    match serde_json::from_slice::<ApiErrorEnvelope>(body) {
        Ok(envelope) => HcloudError::Api {
            status: status.as_u16(),
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => HcloudError::Api {
            status: status.as_u16(),
            code: String::from("unknown"),
            message: String::from_utf8_lossy(body).trim().to_owned(),
        },
    }
}

impl CloudClient for HcloudClient {
    type Error = HcloudError;

    fn server_by_id(&self, id: ServerId) -> ClientFuture<'_, Option<Server>, Self::Error> {
        Box::pin(async move {
            let envelope: Option<ServerEnvelope> =
                self.get(&format!("servers/{id}"), &[], "server").await?;
            Ok(envelope.map(|found| Server::from(found.server)))
        })
    }

    fn create_server<'a>(
        &'a self,
        opts: &'a ServerCreateOpts,
    ) -> ClientFuture<'a, ServerCreateResult, Self::Error> {
        Box::pin(async move {
            let payload = CreateServerRequest {
                name: opts.name.clone(),
                server_type: IdOrName::Id(opts.server_type.id.get()),
                image: IdOrName::Id(opts.image.id.get()),
                ssh_keys: opts.ssh_keys.iter().map(|key| key.id.get()).collect(),
                user_data: opts.user_data.clone(),
                location: opts
                    .location
                    .as_ref()
                    .map(|location| IdOrName::Name(location.name.clone())),
                datacenter: opts
                    .datacenter
                    .as_ref()
                    .map(|datacenter| IdOrName::Name(datacenter.name.clone())),
                start_after_create: true,
                labels: opts.labels.clone(),
            };
            let response: CreateServerResponse =
                self.post("servers", &payload, "create server").await?;
            let server = Server::from(response.server);
            tracing::debug!(server = %server.id, "create-server accepted");
            Ok(ServerCreateResult {
                server,
                action: response.action.map(Action::from),
            })
        })
    }

    fn create_image<'a>(
        &'a self,
        server: &'a Server,
        opts: &'a ImageCreateOpts,
    ) -> ClientFuture<'a, ImageCreateResult, Self::Error> {
        Box::pin(async move {
            let payload = CreateImageRequest {
                description: opts.description.clone(),
                kind: "snapshot",
                labels: opts.labels.clone(),
            };
            let response: CreateImageResponse = self
                .post(
                    &format!("servers/{}/actions/create_image", server.id),
                    &payload,
                    "create image",
                )
                .await?;
            Ok(ImageCreateResult {
                image: Image::from(response.image),
                action: response.action.map(Action::from),
            })
        })
    }

    fn delete_server<'a>(
        &'a self,
        server: &'a Server,
    ) -> ClientFuture<'a, Option<Action>, Self::Error> {
        Box::pin(async move {
            let Some(raw) = self.delete(&format!("servers/{}", server.id)).await? else {
                return Ok(None);
            };
            let envelope: ActionEnvelope = decode(&raw, "delete server")?;
            Ok(envelope.action.map(Action::from))
        })
    }

    fn server_type<'a>(
        &'a self,
        id_or_name: &'a str,
    ) -> ClientFuture<'a, Option<ServerType>, Self::Error> {
        Box::pin(self.lookup(
            "server_types",
            id_or_name,
            "server type",
            |one: ServerTypeEnvelope| ServerType::from(one.server_type),
            |many: ServerTypesEnvelope| many.server_types.into_iter().next().map(ServerType::from),
        ))
    }

    fn image<'a>(&'a self, id_or_name: &'a str) -> ClientFuture<'a, Option<Image>, Self::Error> {
        Box::pin(self.lookup(
            "images",
            id_or_name,
            "image",
            |one: ImageEnvelope| Image::from(one.image),
            |many: ImagesEnvelope| many.images.into_iter().next().map(Image::from),
        ))
    }

    fn ssh_key_by_id(&self, id: SshKeyId) -> ClientFuture<'_, Option<SshKey>, Self::Error> {
        Box::pin(async move {
            let envelope: Option<SshKeyEnvelope> =
                self.get(&format!("ssh_keys/{id}"), &[], "SSH key").await?;
            Ok(envelope.map(|found| SshKey::from(found.ssh_key)))
        })
    }

    fn create_ssh_key<'a>(
        &'a self,
        opts: &'a SshKeyCreateOpts,
    ) -> ClientFuture<'a, SshKey, Self::Error> {
        Box::pin(async move {
            let payload = CreateSshKeyRequest {
                name: opts.name.clone(),
                public_key: opts.public_key.clone(),
                labels: opts.labels.clone(),
            };
            let envelope: SshKeyEnvelope =
                self.post("ssh_keys", &payload, "create SSH key").await?;
            Ok(SshKey::from(envelope.ssh_key))
        })
    }

    fn delete_ssh_key(&self, id: SshKeyId) -> ClientFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.delete(&format!("ssh_keys/{id}")).await?;
            Ok(())
        })
    }

    fn location_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> ClientFuture<'a, Option<Location>, Self::Error> {
        Box::pin(async move {
            let envelope: Option<LocationsEnvelope> =
                self.get("locations", &[("name", name)], "location").await?;
            Ok(envelope.and_then(|found| found.locations.into_iter().next().map(Location::from)))
        })
    }

    fn datacenter_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> ClientFuture<'a, Option<Datacenter>, Self::Error> {
        Box::pin(async move {
            let envelope: Option<DatacentersEnvelope> = self
                .get("datacenters", &[("name", name)], "datacenter")
                .await?;
            Ok(envelope.and_then(|found| {
                found.datacenters.into_iter().next().map(Datacenter::from)
            }))
        })
    }

    fn action_by_id(&self, id: ActionId) -> ClientFuture<'_, Option<Action>, Self::Error> {
        Box::pin(async move {
            let envelope: Option<ActionEnvelope> =
                self.get(&format!("actions/{id}"), &[], "action").await?;
            Ok(envelope.and_then(|found| found.action.map(Action::from)))
        })
    }
}
