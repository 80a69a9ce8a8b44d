//! Shared state between the batch driver and convergence workers.
//!
//! A single [`RebuildContext`] is created per run and shared through an
//! `Arc`. It holds:
//!
//! - the pending queue of routers awaiting convergence confirmation,
//! - the completed set for the current batch,
//! - the one-way shutdown flag every worker watches.
//!
//! # Invariants
//!
//! - A router taken with [`RebuildContext::pop`] is requeued, completed, or
//!   dropped because shutdown was observed. Never more than one of these.
//! - The shutdown flag is never cleared once set.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::router::RouterRef;

/// Orchestration state for one rebuild run.
#[derive(Debug)]
pub struct RebuildContext {
    pending: Mutex<VecDeque<RouterRef>>,
    completed: Mutex<Vec<RouterRef>>,
    shutdown: watch::Sender<bool>,
}

impl RebuildContext {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pending: Mutex::new(VecDeque::new()),
            completed: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    /// Add a router to the pending queue.
    pub fn enqueue(&self, router: RouterRef) {
        lock(&self.pending).push_back(router);
    }

    /// Return a router to the pending queue after a failed poll.
    pub fn requeue(&self, router: RouterRef) {
        self.enqueue(router);
    }

    /// Take any pending router.
    pub fn pop(&self) -> Option<RouterRef> {
        lock(&self.pending).pop_back()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn pending_snapshot(&self) -> Vec<RouterRef> {
        lock(&self.pending).iter().cloned().collect()
    }

    /// Record a router as converged for the current batch.
    pub fn complete(&self, router: RouterRef) {
        lock(&self.completed).push(router);
    }

    pub fn completed_len(&self) -> usize {
        lock(&self.completed).len()
    }

    pub fn completed_snapshot(&self) -> Vec<RouterRef> {
        lock(&self.completed).clone()
    }

    /// Clear the queue and the completed set before a new batch.
    pub fn reset_batch(&self) {
        lock(&self.pending).clear();
        lock(&self.completed).clear();
    }

    /// Tell every worker to stop.
    pub fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

impl Default for RebuildContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Every critical section is a single collection call, so a poisoned lock
/// still guards consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
