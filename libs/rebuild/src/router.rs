//! Router and instance value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Device owner of a router's management port.
pub const DEVICE_OWNER_ROUTER_MGT: &str = "network:router_management";

/// Identifies a router for queueing and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouterRef {
    pub id: String,
    pub name: String,
}

impl RouterRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RouterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.name)
    }
}

/// Lifecycle status shared by routers and instances.
///
/// Upstream reports statuses as upper-case strings; unknown values are kept
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Active,
    Build,
    Down,
    Error,
    Other(String),
}

impl Status {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Build => "BUILD",
            Self::Down => "DOWN",
            Self::Error => "ERROR",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ACTIVE" => Self::Active,
            "BUILD" => Self::Build,
            "DOWN" => Self::Down,
            "ERROR" => Self::Error,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Status {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Status> for String {
    fn from(value: Status) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed IP bound to a router port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    #[serde(default)]
    pub subnet_id: Option<String>,
    pub ip_address: String,
}

/// A port attached to a router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterPort {
    pub id: String,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
}

/// Authoritative router state as reported by the control plane.
///
/// Fetched fresh on every poll; never cached beyond one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterState {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub ports: Vec<RouterPort>,
}

impl RouterState {
    pub fn to_ref(&self) -> RouterRef {
        RouterRef::new(self.id.clone(), self.name.clone())
    }

    /// Address of the management port, if the router has one with an IP.
    pub fn management_address(&self) -> Option<&str> {
        self.ports
            .iter()
            .find(|port| {
                port.device_owner == DEVICE_OWNER_ROUTER_MGT && !port.fixed_ips.is_empty()
            })
            .and_then(|port| port.fixed_ips.last())
            .map(|ip| ip.ip_address.as_str())
    }
}

/// Authoritative state of the compute instance backing a router.
///
/// The instance id changes when the router is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    pub id: String,
    pub status: Status,
    pub image_id: String,
}

impl InstanceState {
    pub fn new(id: impl Into<String>, status: impl Into<Status>, image_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            image_id: image_id.into(),
        }
    }
}
