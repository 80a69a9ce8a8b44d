//! Interfaces to the external services a rebuild run depends on.
//!
//! - [`ControlPlane`]: router metadata (list/show)
//! - [`Compute`]: the instance backing each router
//! - [`RebuildAction`]: asks something else to rebuild a router
//!
//! Implementations live with the caller; tests use in-memory fakes.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::router::{InstanceState, RouterRef, RouterState};

/// Router control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List every router in the fleet.
    async fn list_routers(&self) -> Result<Vec<RouterState>>;

    /// Fetch the current state of a single router.
    async fn show_router(&self, router_id: &str) -> Result<RouterState>;
}

/// Compute service backing the routers.
#[async_trait]
pub trait Compute: Send + Sync {
    /// Resolve the instance currently backing `router`, if any.
    async fn get_instance(&self, router: &RouterRef) -> Result<Option<InstanceState>>;
}

/// Fire-and-forget rebuild request for a single router.
///
/// Must be idempotent; a run may request the same rebuild more than once.
#[async_trait]
pub trait RebuildAction: Send + Sync {
    async fn rebuild(&self, router_id: &str) -> Result<()>;
}

/// Services convergence workers poll.
#[derive(Clone)]
pub struct Collaborators {
    pub control_plane: Arc<dyn ControlPlane>,
    pub compute: Arc<dyn Compute>,
}

impl Collaborators {
    pub fn new(control_plane: Arc<dyn ControlPlane>, compute: Arc<dyn Compute>) -> Self {
        Self {
            control_plane,
            compute,
        }
    }
}
