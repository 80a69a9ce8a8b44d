//! In-memory collaborators for driving workers and the batch driver.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fleet_rebuild::{
    Compute, ControlPlane, InstanceState, PollIntervals, RebuildAction, RebuildContext,
    RouterRef, RouterState, Status,
};

pub const TARGET_IMAGE: &str = "LATEST";

pub fn fast_intervals() -> PollIntervals {
    PollIntervals {
        queue: Duration::from_millis(1),
        poll: Duration::from_millis(1),
        batch: Duration::from_millis(5),
    }
}

pub fn router_state(id: &str, name: &str, status: &str) -> RouterState {
    RouterState {
        id: id.to_string(),
        name: name.to_string(),
        status: Status::from(status),
        tenant_id: Some("tenant-1".to_string()),
        image_id: None,
        ports: vec![],
    }
}

pub fn instance(id: &str, status: &str) -> Option<InstanceState> {
    Some(InstanceState::new(id, status, "OUT-OF-DATE"))
}

/// Poll until `check` holds or the deadline passes.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Control plane that always returns the same router, optionally failing
/// the first few `show_router` calls.
pub struct StaticControlPlane {
    router: RouterState,
    show_calls: AtomicUsize,
    failures: AtomicUsize,
    shutdown_on_failure: Option<Arc<RebuildContext>>,
}

impl StaticControlPlane {
    pub fn new(router: RouterState) -> Self {
        Self {
            router,
            show_calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            shutdown_on_failure: None,
        }
    }

    pub fn failing(mut self, failures: usize) -> Self {
        self.failures = AtomicUsize::new(failures);
        self
    }

    pub fn shutdown_on_failure(mut self, ctx: Arc<RebuildContext>) -> Self {
        self.shutdown_on_failure = Some(ctx);
        self
    }

    pub fn show_calls(&self) -> usize {
        self.show_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for StaticControlPlane {
    async fn list_routers(&self) -> Result<Vec<RouterState>> {
        Ok(vec![self.router.clone()])
    }

    async fn show_router(&self, _router_id: &str) -> Result<RouterState> {
        self.show_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            if let Some(ctx) = &self.shutdown_on_failure {
                ctx.signal_shutdown();
            }
            anyhow::bail!("connection reset by peer");
        }
        Ok(self.router.clone())
    }
}

/// Compute service replaying a fixed sequence of instance states.
///
/// The last state repeats once the script runs out. When built with
/// [`ScriptedCompute::shutdown_before_last`], shutdown is signalled just
/// before the last state is returned.
pub struct ScriptedCompute {
    script: Mutex<VecDeque<Option<InstanceState>>>,
    last: Mutex<Option<InstanceState>>,
    calls: AtomicUsize,
    shutdown: Option<Arc<RebuildContext>>,
}

impl ScriptedCompute {
    pub fn new(script: Vec<Option<InstanceState>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            shutdown: None,
        }
    }

    pub fn shutdown_before_last(mut self, ctx: Arc<RebuildContext>) -> Self {
        self.shutdown = Some(ctx);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compute for ScriptedCompute {
    async fn get_instance(&self, _router: &RouterRef) -> Result<Option<InstanceState>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(next) = script.pop_front() {
            if script.is_empty() {
                if let Some(ctx) = &self.shutdown {
                    ctx.signal_shutdown();
                }
            }
            *last = next;
        }
        Ok(last.clone())
    }
}

/// Compute service that is down for good.
#[derive(Default)]
pub struct FailingCompute {
    calls: AtomicUsize,
}

impl FailingCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compute for FailingCompute {
    async fn get_instance(&self, _router: &RouterRef) -> Result<Option<InstanceState>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        anyhow::bail!("503 Service Unavailable")
    }
}

#[derive(Debug, Clone)]
struct FleetRouter {
    state: RouterState,
    instance: Option<InstanceState>,
    rebuild_requested: bool,
    generation: u32,
}

/// A whole fleet whose routers swap to a new instance on the first
/// `show_router` after a rebuild is requested.
///
/// Routers marked stuck accept rebuild requests but never change.
#[derive(Default)]
pub struct FakeFleet {
    routers: Mutex<Vec<FleetRouter>>,
    stuck: Mutex<HashSet<String>>,
    rebuilds: Mutex<Vec<String>>,
    lookup_failures: Mutex<HashSet<String>>,
    hanging_lookups: Mutex<HashMap<String, usize>>,
    lookups: AtomicUsize,
    fail_rebuilds: Mutex<bool>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a router backed by `instance_image`, or by nothing.
    pub fn with_router(self, id: &str, name: &str, instance_image: Option<&str>) -> Self {
        let instance =
            instance_image.map(|image| InstanceState::new(format!("vm-{id}-0"), "ACTIVE", image));
        self.routers.lock().unwrap().push(FleetRouter {
            state: router_state(id, name, "ACTIVE"),
            instance,
            rebuild_requested: false,
            generation: 0,
        });
        self
    }

    pub fn stuck(self, id: &str) -> Self {
        self.stuck.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn failing_lookup(self, id: &str) -> Self {
        self.lookup_failures.lock().unwrap().insert(id.to_string());
        self
    }

    /// Instance lookups for `id` never return once `answered` have.
    pub fn hanging_lookup_after(self, id: &str, answered: usize) -> Self {
        self.hanging_lookups
            .lock()
            .unwrap()
            .insert(id.to_string(), answered);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn failing_rebuilds(self) -> Self {
        *self.fail_rebuilds.lock().unwrap() = true;
        self
    }

    pub fn rebuilds(&self) -> Vec<String> {
        self.rebuilds.lock().unwrap().clone()
    }

    pub fn instance_ids(&self) -> HashMap<String, Option<String>> {
        self.routers
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.state.id.clone(), r.instance.as_ref().map(|i| i.id.clone())))
            .collect()
    }
}

#[async_trait]
impl ControlPlane for FakeFleet {
    async fn list_routers(&self) -> Result<Vec<RouterState>> {
        Ok(self
            .routers
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.state.clone())
            .collect())
    }

    async fn show_router(&self, router_id: &str) -> Result<RouterState> {
        let stuck = self.stuck.lock().unwrap().contains(router_id);
        let mut routers = self.routers.lock().unwrap();
        let router = routers
            .iter_mut()
            .find(|r| r.state.id == router_id)
            .ok_or_else(|| anyhow::anyhow!("router {router_id} not found"))?;

        if router.rebuild_requested && !stuck {
            router.rebuild_requested = false;
            router.generation += 1;
            router.instance = Some(InstanceState::new(
                format!("vm-{}-{}", router_id, router.generation),
                "ACTIVE",
                TARGET_IMAGE,
            ));
        }
        Ok(router.state.clone())
    }
}

#[async_trait]
impl Compute for FakeFleet {
    async fn get_instance(&self, router: &RouterRef) -> Result<Option<InstanceState>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let hang = match self.hanging_lookups.lock().unwrap().get_mut(&router.id) {
            Some(0) => true,
            Some(answered) => {
                *answered -= 1;
                false
            }
            None => false,
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if self.lookup_failures.lock().unwrap().contains(&router.id) {
            anyhow::bail!("compute API unavailable");
        }
        Ok(self
            .routers
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.state.id == router.id)
            .and_then(|r| r.instance.clone()))
    }
}

#[async_trait]
impl RebuildAction for FakeFleet {
    async fn rebuild(&self, router_id: &str) -> Result<()> {
        if *self.fail_rebuilds.lock().unwrap() {
            anyhow::bail!("orchestrator rejected command");
        }
        self.rebuilds.lock().unwrap().push(router_id.to_string());
        if let Some(router) = self
            .routers
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.state.id == router_id)
        {
            router.rebuild_requested = true;
        }
        Ok(())
    }
}
