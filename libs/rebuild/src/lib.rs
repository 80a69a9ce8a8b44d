//! Batched router rebuilds.
//!
//! Rebuilds a fleet of virtual routers a fixed number at a time. Each router
//! in a batch gets a rebuild request, then a pool of convergence workers
//! polls the control plane and compute service until the router is backed by
//! a *new* instance and both report ACTIVE.
//!
//! ## Architecture
//!
//! ```text
//! BatchRebuilder            (chunks the fleet, issues rebuilds, waits)
//! ├── RebuildContext        (pending queue, completed set, shutdown flag)
//! └── WorkerPool
//!     └── ConvergenceWorker (pops, polls, completes or requeues)
//! ```
//!
//! External services are reached through the traits in [`collaborators`];
//! progress is written through a [`report::Reporter`].

pub mod channel;
pub mod collaborators;
pub mod config;
pub mod driver;
pub mod error;
pub mod interrupt;
pub mod pool;
pub mod report;
pub mod router;
pub mod worker;

pub use channel::RebuildContext;
pub use collaborators::{Collaborators, Compute, ControlPlane, RebuildAction};
pub use config::{BatchSize, PollIntervals, RebuildConfig};
pub use driver::{chunked, BatchRebuilder, RunSummary};
pub use error::RebuildError;
pub use interrupt::{AbortSignal, InterruptHandle, InterruptOutcome, Interrupts};
pub use pool::WorkerPool;
pub use report::{MemoryReporter, Reporter, TerminalReporter, Tone};
pub use router::{InstanceState, RouterRef, RouterState, Status};
pub use worker::{classify, ConvergenceWorker, Progress};
