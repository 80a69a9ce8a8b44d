//! Convergence worker.
//!
//! Each worker self-serves from the shared pending queue. For every router
//! it takes, it records the id of the instance currently backing it, then
//! polls until a *different* instance is ACTIVE and the router itself is
//! ACTIVE. A rebuild replaces the instance, so the old instance reporting
//! ACTIVE does not count.
//!
//! Per-router lifecycle:
//!
//! ```text
//! ENQUEUED -> POLLING -> CONVERGED           (completed set)
//!                     -> REQUEUED-ON-ERROR   (back to ENQUEUED, any worker)
//! ```
//!
//! Shutdown abandons whatever the worker is polling without a transition.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::RebuildContext;
use crate::collaborators::Collaborators;
use crate::config::PollIntervals;
use crate::report::Reporter;
use crate::router::{InstanceState, RouterRef, RouterState, Status};

/// Result of classifying one poll of a router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// A new instance is ACTIVE and so is the router.
    Converged { instance_id: String },

    /// No instance backs the router yet.
    AwaitingInstance,

    /// An instance exists but is not ACTIVE.
    InstanceNotActive(Status),

    /// The instance is still the one seen before the rebuild.
    InstanceUnchanged,

    /// A new instance is ACTIVE but the router is not.
    RouterNotActive(Status),
}

impl Progress {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Classify a router's rebuild progress against its pre-rebuild instance id.
pub fn classify(
    router: &RouterState,
    instance: Option<&InstanceState>,
    baseline: Option<&str>,
) -> Progress {
    let Some(instance) = instance else {
        return Progress::AwaitingInstance;
    };
    if !instance.status.is_active() {
        return Progress::InstanceNotActive(instance.status.clone());
    }
    if baseline == Some(instance.id.as_str()) {
        return Progress::InstanceUnchanged;
    }
    if !router.status.is_active() {
        return Progress::RouterNotActive(router.status.clone());
    }
    Progress::Converged {
        instance_id: instance.id.clone(),
    }
}

/// One slot of the worker pool.
pub struct ConvergenceWorker {
    id: usize,
    ctx: Arc<RebuildContext>,
    collaborators: Collaborators,
    reporter: Arc<dyn Reporter>,
    intervals: PollIntervals,
    shutdown: watch::Receiver<bool>,
}

impl ConvergenceWorker {
    pub fn new(
        id: usize,
        ctx: Arc<RebuildContext>,
        collaborators: Collaborators,
        reporter: Arc<dyn Reporter>,
        intervals: PollIntervals,
    ) -> Self {
        let shutdown = ctx.subscribe_shutdown();
        Self {
            id,
            ctx,
            collaborators,
            reporter,
            intervals,
            shutdown,
        }
    }

    /// Process routers until shutdown.
    pub async fn run(mut self) {
        debug!(worker = self.id, "Convergence worker started");

        while let Some(router) = self.next_router().await {
            self.converge(router).await;
        }

        self.reporter
            .warning(&format!("Worker {} is exiting...", self.id));
        debug!(worker = self.id, "Convergence worker stopped");
    }

    /// Wait for a pending router. `None` once shutdown is observed.
    async fn next_router(&mut self) -> Option<RouterRef> {
        loop {
            if self.ctx.is_shutdown() {
                return None;
            }
            if let Some(router) = self.ctx.pop() {
                return Some(router);
            }
            self.throttle(self.intervals.queue).await;
        }
    }

    /// Sleep for `period`, waking early if shutdown is signalled.
    async fn throttle(&mut self, period: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            Ok(()) = self.shutdown.changed() => {}
        }
    }

    /// Poll `router` until it converges, fails, or shutdown is observed.
    async fn converge(&mut self, router: RouterRef) {
        let baseline = match self.collaborators.compute.get_instance(&router).await {
            Ok(instance) => instance.map(|instance| instance.id),
            Err(e) => {
                // The requeued router is popped again straight away.
                self.throttle(self.intervals.poll).await;
                self.requeue_after_error(router, e);
                return;
            }
        };

        debug!(
            worker = self.id,
            router_id = %router.id,
            baseline = baseline.as_deref().unwrap_or("none"),
            "Polling router for convergence"
        );

        while !self.ctx.is_shutdown() {
            self.throttle(self.intervals.poll).await;
            if self.ctx.is_shutdown() {
                break;
            }

            match self.poll(&router, baseline.as_deref()).await {
                Ok(Progress::Converged { instance_id }) => {
                    info!(
                        worker = self.id,
                        router_id = %router.id,
                        instance_id = %instance_id,
                        "Router converged"
                    );
                    self.reporter.success(&format!(
                        "{} is ACTIVE, new instance is {}",
                        router.id, instance_id
                    ));
                    self.ctx.complete(router);
                    return;
                }
                Ok(progress) => {
                    debug!(
                        worker = self.id,
                        router_id = %router.id,
                        ?progress,
                        "Router not converged yet"
                    );
                }
                Err(e) => {
                    self.requeue_after_error(router, e);
                    return;
                }
            }
        }

        debug!(
            worker = self.id,
            router_id = %router.id,
            "Abandoning router on shutdown"
        );
    }

    async fn poll(&self, router: &RouterRef, baseline: Option<&str>) -> Result<Progress> {
        let state = self
            .collaborators
            .control_plane
            .show_router(&router.id)
            .await?;
        let instance = self
            .collaborators
            .compute
            .get_instance(&state.to_ref())
            .await?;
        Ok(classify(&state, instance.as_ref(), baseline))
    }

    fn requeue_after_error(&self, router: RouterRef, error: anyhow::Error) {
        warn!(
            worker = self.id,
            router_id = %router.id,
            error = %error,
            "Error polling router, requeueing"
        );
        self.reporter.failure(&format!(
            "Worker {} encountered an error handling router {}: {:#}",
            self.id, router.id, error
        ));
        self.ctx.requeue(router);
    }
}
