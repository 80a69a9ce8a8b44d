//! Single-router commands sent to the orchestrator.
//!
//! Each message carries the router's tenant so the orchestrator can route it
//! to the right worker without its own control plane lookup.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use fleet_rebuild::{ControlPlane, RebuildAction};
use serde::Serialize;
use tracing::info;

use crate::client::ApiClient;
use crate::config::Config;

/// Commands the orchestrator accepts for a single router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouterCommand {
    #[serde(rename = "router-update")]
    Update,
    #[serde(rename = "router-rebuild")]
    Rebuild,
    #[serde(rename = "router-debug")]
    Debug,
    #[serde(rename = "router-manage")]
    Manage,
}

impl RouterCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "router-update",
            Self::Rebuild => "router-rebuild",
            Self::Debug => "router-debug",
            Self::Manage => "router-manage",
        }
    }
}

impl fmt::Display for RouterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire format of a command message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandMessage {
    pub command: RouterCommand,
    pub router_id: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_image_uuid: Option<String>,
}

/// Posts command messages to the orchestrator.
pub struct MessageSender {
    control_plane: Arc<dyn ControlPlane>,
    orchestrator: ApiClient,
}

impl MessageSender {
    pub fn new(config: &Config, control_plane: Arc<dyn ControlPlane>) -> Result<Self> {
        Ok(Self {
            control_plane,
            orchestrator: ApiClient::new(
                &config.orchestrator_url,
                config.auth_token.as_deref(),
                config.request_timeout(),
            )?,
        })
    }

    /// Build the message for `command` on `router_id`.
    ///
    /// The wildcard ids `*` and `error` address every router (or the error
    /// handler) and skip the tenant lookup.
    pub async fn make_message(
        &self,
        command: RouterCommand,
        router_id: &str,
        router_image_uuid: Option<String>,
    ) -> Result<CommandMessage> {
        let router_id = router_id.to_lowercase();
        let tenant_id = match router_id.as_str() {
            "*" | "error" => router_id.clone(),
            _ => {
                let router = self.control_plane.show_router(&router_id).await?;
                anyhow::ensure!(
                    router.id == router_id,
                    "Control plane returned router {} when asked for {}",
                    router.id,
                    router_id
                );
                router.tenant_id.ok_or_else(|| {
                    anyhow::anyhow!("Router {} has no owning tenant", router_id)
                })?
            }
        };

        Ok(CommandMessage {
            command,
            router_id,
            tenant_id,
            router_image_uuid,
        })
    }

    /// Send `command` for `router_id`.
    pub async fn send(
        &self,
        command: RouterCommand,
        router_id: &str,
        router_image_uuid: Option<String>,
    ) -> Result<CommandMessage> {
        let message = self
            .make_message(command, router_id, router_image_uuid)
            .await?;
        info!(
            command = %message.command,
            tenant_id = %message.tenant_id,
            router_id = %message.router_id,
            "Sending router command"
        );
        self.orchestrator.post("/v1/commands", &message).await?;
        Ok(message)
    }
}

#[async_trait]
impl RebuildAction for MessageSender {
    async fn rebuild(&self, router_id: &str) -> Result<()> {
        self.send(RouterCommand::Rebuild, router_id, None).await?;
        Ok(())
    }
}
