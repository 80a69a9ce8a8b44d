//! HTTP clients for the network control plane and compute service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fleet_rebuild::{Compute, ControlPlane, InstanceState, RouterRef, RouterState, Status};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::CliError;

/// Header carrying the auth token.
const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Compute instances backing routers are named with this prefix and the
/// router id.
pub const INSTANCE_NAME_PREFIX: &str = "ak-";

/// JSON API client bound to one service endpoint.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url`, authenticating with `token` if given.
    /// Requests that take longer than `timeout` fail.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = token {
            headers.insert(
                AUTH_TOKEN_HEADER,
                HeaderValue::from_str(token).context("Invalid token format")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }

    /// Make a GET request with query parameters.
    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, CliError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.client.get(url).query(query).send().await?;

        self.handle_response(response).await
    }

    /// Make a POST request, ignoring any response body.
    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<(), CliError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self.client.post(url).json(body).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error(response).await
        }
    }

    /// Handle a successful or error response.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CliError> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to parse response: {}", e)))
        } else {
            self.handle_error(response).await
        }
    }

    /// Handle an error response.
    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, CliError> {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| {
            if body.is_empty() {
                "Unknown error".to_string()
            } else {
                body
            }
        });

        Err(CliError::api(status, message))
    }
}

/// Pull a message out of the upstream error envelopes
/// (`{"NeutronError": {"message"}}`, `{"itemNotFound": {"message"}}`,
/// `{"message"}`).
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }
    value
        .as_object()?
        .values()
        .find_map(|inner| inner.get("message").and_then(|m| m.as_str()))
        .map(str::to_string)
}

fn not_found(err: CliError, what: String) -> CliError {
    match err {
        CliError::Api { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
            CliError::NotFound(what)
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct RoutersResponse {
    routers: Vec<RouterState>,
}

#[derive(Debug, Deserialize)]
struct RouterResponse {
    router: RouterState,
}

/// Router API of the network control plane.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    api: ApiClient,
}

impl HttpControlPlane {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(
                &config.network_url,
                config.auth_token.as_deref(),
                config.request_timeout(),
            )?,
        })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn list_routers(&self) -> Result<Vec<RouterState>> {
        let response: RoutersResponse = self.api.get("/v2.0/routers").await?;
        Ok(response.routers)
    }

    async fn show_router(&self, router_id: &str) -> Result<RouterState> {
        let response: RouterResponse = self
            .api
            .get(&format!("/v2.0/routers/{}", router_id))
            .await
            .map_err(|e| not_found(e, format!("Router '{}' not found", router_id)))?;
        Ok(response.router)
    }
}

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: Vec<ServerResponse>,
}

#[derive(Debug, Deserialize)]
struct ServerResponse {
    id: String,
    #[serde(default)]
    name: String,
    status: Status,
    /// An object with an `id`, or an empty string for volume-backed servers.
    #[serde(default)]
    image: serde_json::Value,
}

impl ServerResponse {
    fn into_instance(self) -> InstanceState {
        let image_id = self
            .image
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or_default()
            .to_string();
        InstanceState {
            id: self.id,
            status: self.status,
            image_id,
        }
    }
}

/// Server API of the compute service.
#[derive(Debug, Clone)]
pub struct HttpCompute {
    api: ApiClient,
}

impl HttpCompute {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(
                &config.compute_url,
                config.auth_token.as_deref(),
                config.request_timeout(),
            )?,
        })
    }

    /// Fail unless the image exists.
    pub async fn ensure_image(&self, image_id: &str) -> Result<(), CliError> {
        self.api
            .get::<serde_json::Value>(&format!("/images/{}", image_id))
            .await
            .map_err(|e| not_found(e, format!("Image '{}' not found", image_id)))?;
        Ok(())
    }
}

#[async_trait]
impl Compute for HttpCompute {
    async fn get_instance(&self, router: &RouterRef) -> Result<Option<InstanceState>> {
        let name = format!("{}{}", INSTANCE_NAME_PREFIX, router.id);
        let response: ServersResponse = self
            .api
            .get_with_query("/servers/detail", &[("name", name.as_str())])
            .await?;

        // The name filter is a pattern match upstream.
        Ok(response
            .servers
            .into_iter()
            .find(|server| server.name == name)
            .map(ServerResponse::into_instance))
    }
}
