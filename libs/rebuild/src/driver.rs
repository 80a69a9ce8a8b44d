//! Batch driver.
//!
//! The driver:
//! - Splits the fleet into consecutive batches
//! - Skips routers with no instance or already on the target image
//! - Requests a rebuild for the rest and queues them for the workers
//! - Waits until the workers have confirmed every queued router, or the
//!   operator interrupts, before moving to the next batch
//!
//! Once every batch is done it shuts the worker pool down and joins it. An
//! interrupt outside a batch wait aborts the run, join included, and cancels
//! the workers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::RebuildContext;
use crate::collaborators::{Collaborators, RebuildAction};
use crate::config::RebuildConfig;
use crate::error::RebuildError;
use crate::interrupt::Interrupts;
use crate::pool::WorkerPool;
use crate::report::Reporter;
use crate::router::{RouterRef, RouterState};

/// Split `items` into consecutive chunks of at most `size`, keeping order.
///
/// # Panics
///
/// Panics if `size` is zero; use [`crate::config::BatchSize`] to validate.
pub fn chunked<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size)
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Routers listed by the control plane.
    pub total: usize,

    /// Batches processed.
    pub batches: usize,

    /// Routers a rebuild was requested for.
    pub rebuilt: usize,

    /// Routers confirmed converged while their batch was being waited on.
    pub converged: usize,

    /// Routers already on the target image.
    pub up_to_date: usize,

    /// Routers with no backing instance.
    pub missing: usize,

    /// Batches whose wait was cut short by the operator.
    pub interrupted: usize,
}

/// How a batch wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchOutcome {
    Completed,
    Interrupted { remaining: usize },
}

/// Drives a full batch rebuild run.
pub struct BatchRebuilder {
    ctx: Arc<RebuildContext>,
    collaborators: Collaborators,
    action: Arc<dyn RebuildAction>,
    reporter: Arc<dyn Reporter>,
    config: RebuildConfig,
    workers: Option<usize>,
}

impl BatchRebuilder {
    pub fn new(
        collaborators: Collaborators,
        action: Arc<dyn RebuildAction>,
        reporter: Arc<dyn Reporter>,
        config: RebuildConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(RebuildContext::new()),
            collaborators,
            action,
            reporter,
            config,
            workers: None,
        }
    }

    /// Spawn exactly `workers` workers instead of sizing the pool from the
    /// batch size and host parallelism.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Shared state of this run.
    pub fn context(&self) -> Arc<RebuildContext> {
        Arc::clone(&self.ctx)
    }

    /// Rebuild the whole fleet, batch by batch.
    pub async fn run(&self, mut interrupts: Interrupts) -> Result<RunSummary, RebuildError> {
        let batch_size = self.config.batch_size.get();
        self.reporter
            .info(&format!("Restarting routers in batches of {}...", batch_size));

        let mut abort = interrupts.abort_signal();
        let mut pool = self.spawn_pool();

        let result = tokio::select! {
            result = self.run_batches(&mut interrupts) => result,
            () = abort.recv() => Err(RebuildError::Aborted),
        };

        if matches!(result, Err(RebuildError::Aborted)) {
            warn!("Batch rebuild aborted, cancelling workers");
            pool.abort();
            return result;
        }

        if result.is_ok() {
            self.reporter.warning("Waiting on workers to finish...");
        }
        tokio::select! {
            joined = pool.shutdown() => joined?,
            () = abort.recv() => {
                warn!("Batch rebuild aborted while joining workers");
                pool.abort();
                return Err(RebuildError::Aborted);
            }
        }

        let summary = result?;
        info!(
            total = summary.total,
            batches = summary.batches,
            rebuilt = summary.rebuilt,
            converged = summary.converged,
            interrupted = summary.interrupted,
            "Batch rebuild finished"
        );
        Ok(summary)
    }

    fn spawn_pool(&self) -> WorkerPool {
        let ctx = Arc::clone(&self.ctx);
        let collaborators = self.collaborators.clone();
        let reporter = Arc::clone(&self.reporter);
        let intervals = self.config.intervals;

        match self.workers {
            Some(size) => WorkerPool::spawn_exact(ctx, collaborators, reporter, intervals, size),
            None => WorkerPool::spawn(
                ctx,
                collaborators,
                reporter,
                intervals,
                self.config.batch_size.get(),
            ),
        }
    }

    async fn run_batches(&self, interrupts: &mut Interrupts) -> Result<RunSummary, RebuildError> {
        let routers = self
            .collaborators
            .control_plane
            .list_routers()
            .await
            .map_err(RebuildError::ListRouters)?;

        let batch_size = self.config.batch_size.get();
        let batch_count = routers.len().div_ceil(batch_size);
        let mut summary = RunSummary {
            total: routers.len(),
            ..RunSummary::default()
        };

        for (index, chunk) in chunked(&routers, batch_size).enumerate() {
            summary.batches += 1;
            self.ctx.reset_batch();

            let rebooting = self.prepare_batch(chunk, &mut summary).await?;
            if rebooting.is_empty() {
                debug!(batch = index + 1, "Nothing to rebuild in batch");
                continue;
            }

            self.request_rebuilds(&rebooting).await?;
            summary.rebuilt += rebooting.len();

            self.reporter.info(&format!(
                "{} batch {} / {} {}",
                "-".repeat(25),
                index + 1,
                batch_count,
                "-".repeat(25)
            ));
            info!(
                batch = index + 1,
                batches = batch_count,
                rebuilding = rebooting.len(),
                "Waiting on batch"
            );

            match self.wait_for_batch(rebooting.len(), interrupts).await {
                BatchOutcome::Completed => {
                    summary.converged += rebooting.len();
                }
                BatchOutcome::Interrupted { remaining } => {
                    summary.converged += rebooting.len() - remaining;
                    summary.interrupted += 1;
                    info!(batch = index + 1, remaining, "Batch wait interrupted");
                }
            }
        }

        Ok(summary)
    }

    /// Decide which routers in `chunk` need a rebuild.
    async fn prepare_batch(
        &self,
        chunk: &[RouterState],
        summary: &mut RunSummary,
    ) -> Result<Vec<RouterRef>, RebuildError> {
        let mut rebooting = Vec::new();

        for router in chunk {
            let router = router.to_ref();
            let instance = self
                .collaborators
                .compute
                .get_instance(&router)
                .await
                .map_err(|source| RebuildError::Lookup {
                    router_id: router.id.clone(),
                    source,
                })?;

            match instance {
                None => {
                    self.reporter
                        .failure(&format!("No instance found for {}!", router.id));
                    summary.missing += 1;
                }
                Some(instance) if instance.image_id == self.config.target_image_id => {
                    self.reporter.success(&format!(
                        "Router {} is already up-to-date, skipping!",
                        router.id
                    ));
                    summary.up_to_date += 1;
                }
                Some(_) => {
                    self.reporter
                        .warning(&format!("Rebuilding {}...", router));
                    rebooting.push(router);
                }
            }
        }

        Ok(rebooting)
    }

    /// Queue each router, then ask for its rebuild. Queueing first lets a
    /// worker record the pre-rebuild instance id.
    async fn request_rebuilds(&self, rebooting: &[RouterRef]) -> Result<(), RebuildError> {
        for router in rebooting {
            self.ctx.enqueue(router.clone());
            self.action
                .rebuild(&router.id)
                .await
                .map_err(|source| RebuildError::Rebuild {
                    router_id: router.id.clone(),
                    source,
                })?;
            debug!(router_id = %router.id, "Rebuild requested");
        }
        Ok(())
    }

    /// Block until `total` routers are confirmed or the operator interrupts.
    async fn wait_for_batch(&self, total: usize, interrupts: &mut Interrupts) -> BatchOutcome {
        let _waiting = interrupts.begin_wait();
        self.reporter.info(&waiting_message(total));

        let mut outstanding = total;
        loop {
            let done = self.ctx.completed_len();
            if done >= total {
                return BatchOutcome::Completed;
            }

            let remaining = total - done;
            if remaining < outstanding {
                outstanding = remaining;
                self.reporter.info(&waiting_message(remaining));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.intervals.batch) => {}
                _ = interrupts.recv() => {
                    self.reporter.info("Continuing with next batch of routers...");
                    return BatchOutcome::Interrupted { remaining };
                }
            }
        }
    }
}

fn waiting_message(outstanding: usize) -> String {
    format!(
        "Waiting on {} routers to become ACTIVE....<Ctrl-C to skip>",
        outstanding
    )
}
