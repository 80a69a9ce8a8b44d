//! Rebuild errors.

use thiserror::Error;

/// Errors that end a batch rebuild run.
///
/// Errors raised while a worker polls a single router never surface here;
/// the worker reports them and requeues the router.
#[derive(Debug, Error)]
pub enum RebuildError {
    /// Batch size must be at least one.
    #[error("batch size must be a positive integer, got {0}")]
    InvalidBatchSize(usize),

    /// Listing the fleet failed.
    #[error("failed to list routers: {0:#}")]
    ListRouters(#[source] anyhow::Error),

    /// Resolving a router's instance failed.
    #[error("failed to look up instance for router {router_id}: {source:#}")]
    Lookup {
        router_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The rebuild action for a router failed.
    #[error("failed to request rebuild of router {router_id}: {source:#}")]
    Rebuild {
        router_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A worker task panicked or was cancelled.
    #[error("worker {worker} did not exit cleanly: {source}")]
    WorkerPanicked {
        worker: usize,
        #[source]
        source: tokio::task::JoinError,
    },

    /// The operator interrupted the run outside a batch wait.
    #[error("run aborted by operator")]
    Aborted,
}
