//! Fixed-size pool of convergence workers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::RebuildContext;
use crate::collaborators::Collaborators;
use crate::config::PollIntervals;
use crate::error::RebuildError;
use crate::report::Reporter;
use crate::worker::ConvergenceWorker;

/// Number of workers to spawn for a requested size.
pub fn pool_size(requested: usize, available: usize) -> usize {
    requested.min(available)
}

/// Parallelism the host reports, or 1 if it cannot tell.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Running convergence workers.
///
/// Workers pull from the shared queue on their own; the pool only starts
/// them and joins them after shutdown. Dropping the pool without calling
/// [`WorkerPool::shutdown`] or [`WorkerPool::abort`] leaves the tasks to die
/// with the runtime.
pub struct WorkerPool {
    ctx: Arc<RebuildContext>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `min(requested, available_parallelism())` workers.
    pub fn spawn(
        ctx: Arc<RebuildContext>,
        collaborators: Collaborators,
        reporter: Arc<dyn Reporter>,
        intervals: PollIntervals,
        requested: usize,
    ) -> Self {
        let size = pool_size(requested, available_parallelism());
        Self::spawn_exact(ctx, collaborators, reporter, intervals, size)
    }

    /// Spawn exactly `size` workers.
    pub fn spawn_exact(
        ctx: Arc<RebuildContext>,
        collaborators: Collaborators,
        reporter: Arc<dyn Reporter>,
        intervals: PollIntervals,
        size: usize,
    ) -> Self {
        let handles = (0..size)
            .map(|id| {
                let worker = ConvergenceWorker::new(
                    id,
                    Arc::clone(&ctx),
                    collaborators.clone(),
                    Arc::clone(&reporter),
                    intervals,
                );
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();

        info!(workers = handles.len(), "Spawned convergence workers");
        reporter.info(&format!("Spawned {} workers!", handles.len()));

        Self { ctx, handles }
    }

    /// Signal shutdown and wait for every worker to exit.
    pub async fn shutdown(&mut self) -> Result<(), RebuildError> {
        self.ctx.signal_shutdown();

        for (worker, handle) in self.handles.iter_mut().enumerate() {
            handle
                .await
                .map_err(|source| RebuildError::WorkerPanicked { worker, source })?;
            debug!(worker, "Worker joined");
        }
        self.handles.clear();

        Ok(())
    }

    /// Signal shutdown and cancel every worker without waiting for it.
    pub fn abort(&mut self) {
        self.ctx.signal_shutdown();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        debug!("Workers aborted");
    }
}
