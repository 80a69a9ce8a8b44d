//! Operator interrupts.
//!
//! What an interrupt does depends on where the driver is. While it waits on a
//! batch, the interrupt cuts that wait short and the run moves on to the next
//! batch. Anywhere else (listing, instance lookups, rebuild requests, joining
//! the workers) the interrupt aborts the run.
//!
//! Wait skips are counted on one `watch` channel, aborts are a one-way flag on
//! another. A shared `waiting` flag tells [`InterruptHandle::interrupt`] which
//! one to use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// What an interrupt was turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// The current batch wait is cut short.
    SkipWait,
    /// The run is aborted.
    Abort,
}

/// Sending side, typically wired to Ctrl-C.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    skips: Arc<watch::Sender<u64>>,
    abort: Arc<watch::Sender<bool>>,
    waiting: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Record an operator interrupt.
    pub fn interrupt(&self) -> InterruptOutcome {
        if self.waiting.load(Ordering::SeqCst) {
            self.skips.send_modify(|count| *count += 1);
            InterruptOutcome::SkipWait
        } else {
            self.abort.send_replace(true);
            InterruptOutcome::Abort
        }
    }
}

/// Receiving side, owned by the batch driver.
#[derive(Debug)]
pub struct Interrupts {
    skips: watch::Receiver<u64>,
    abort: watch::Receiver<bool>,
    waiting: Arc<AtomicBool>,
}

impl Interrupts {
    pub fn channel() -> (InterruptHandle, Interrupts) {
        let (skips_tx, skips) = watch::channel(0);
        let (abort_tx, abort) = watch::channel(false);
        let waiting = Arc::new(AtomicBool::new(false));
        let handle = InterruptHandle {
            skips: Arc::new(skips_tx),
            abort: Arc::new(abort_tx),
            waiting: Arc::clone(&waiting),
        };
        (
            handle,
            Interrupts {
                skips,
                abort,
                waiting,
            },
        )
    }

    /// An interrupt source that never fires.
    pub fn never() -> Self {
        let (_, interrupts) = Self::channel();
        interrupts
    }

    /// Enter a batch wait. Skips recorded before this call are forgotten;
    /// interrupts route to [`Interrupts::recv`] until the scope is dropped.
    pub fn begin_wait(&mut self) -> WaitScope {
        self.waiting.store(true, Ordering::SeqCst);
        self.skips.borrow_and_update();
        WaitScope {
            waiting: Arc::clone(&self.waiting),
        }
    }

    /// Resolve on the next wait skip. Pends forever once every handle is gone.
    pub async fn recv(&mut self) {
        if self.skips.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Abort notifications, independent of the wait skips.
    pub fn abort_signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.abort.clone(),
        }
    }
}

/// Marks the driver as inside a batch wait while alive.
#[derive(Debug)]
pub struct WaitScope {
    waiting: Arc<AtomicBool>,
}

impl Drop for WaitScope {
    fn drop(&mut self) {
        self.waiting.store(false, Ordering::SeqCst);
    }
}

/// Resolves once the run has been aborted.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once aborted, immediately if that already happened. Pends
    /// forever if every handle is gone without aborting.
    pub async fn recv(&mut self) {
        let aborted = self.rx.wait_for(|aborted| *aborted).await.is_ok();
        if !aborted {
            std::future::pending::<()>().await;
        }
    }
}
