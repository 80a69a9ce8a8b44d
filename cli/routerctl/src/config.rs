//! Configuration loading.
//!
//! Settings come from a JSON file (either `--config` or `config.json` in the
//! platform config directory), then environment variables override
//! individual fields. A missing default file means defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use fleet_rebuild::PollIntervals;
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Get the default config file path.
fn default_config_path() -> Result<PathBuf> {
    ProjectDirs::from("org", "routerctl", "rctl")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Network control plane endpoint (routers).
    #[serde(default = "default_network_url")]
    pub network_url: String,

    /// Compute endpoint (instances, images).
    #[serde(default = "default_compute_url")]
    pub compute_url: String,

    /// Orchestrator command endpoint.
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,

    /// Token sent as `X-Auth-Token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Image every router should be running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_image_uuid: Option<String>,

    /// Per-request timeout for every HTTP call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub intervals: IntervalSettings,
}

fn default_network_url() -> String {
    "http://localhost:9696".to_string()
}

fn default_compute_url() -> String {
    "http://localhost:8774/v2.1".to_string()
}

fn default_orchestrator_url() -> String {
    "http://localhost:44250".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_url: default_network_url(),
            compute_url: default_compute_url(),
            orchestrator_url: default_orchestrator_url(),
            auth_token: None,
            router_image_uuid: None,
            request_timeout_secs: default_request_timeout_secs(),
            intervals: IntervalSettings::default(),
        }
    }
}

impl Config {
    /// Load config from `path`, or from the default location, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from a specific file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Override fields from `RCTL_*` variables found by `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("RCTL_NETWORK_URL") {
            self.network_url = url;
        }
        if let Some(url) = lookup("RCTL_COMPUTE_URL") {
            self.compute_url = url;
        }
        if let Some(url) = lookup("RCTL_ORCHESTRATOR_URL") {
            self.orchestrator_url = url;
        }
        if let Some(token) = lookup("RCTL_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Some(image) = lookup("RCTL_ROUTER_IMAGE_UUID") {
            self.router_image_uuid = Some(image);
        }
    }
}

/// Polling intervals, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSettings {
    #[serde(default = "default_queue_secs")]
    pub queue_secs: u64,

    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,

    #[serde(default = "default_batch_secs")]
    pub batch_secs: u64,
}

fn default_queue_secs() -> u64 {
    1
}

fn default_poll_secs() -> u64 {
    1
}

fn default_batch_secs() -> u64 {
    5
}

impl Default for IntervalSettings {
    fn default() -> Self {
        Self {
            queue_secs: default_queue_secs(),
            poll_secs: default_poll_secs(),
            batch_secs: default_batch_secs(),
        }
    }
}

impl IntervalSettings {
    pub fn to_poll_intervals(self) -> PollIntervals {
        PollIntervals {
            queue: Duration::from_secs(self.queue_secs),
            poll: Duration::from_secs(self.poll_secs),
            batch: Duration::from_secs(self.batch_secs),
        }
    }
}
