//! Batch sizing and polling intervals.

use std::fmt;
use std::time::Duration;

use crate::error::RebuildError;

/// Number of routers rebuilt per batch when the operator does not choose.
pub const DEFAULT_BATCH_SIZE: usize = 15;

/// A positive batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(usize);

impl BatchSize {
    pub fn new(size: usize) -> Result<Self, RebuildError> {
        if size == 0 {
            return Err(RebuildError::InvalidBatchSize(size));
        }
        Ok(Self(size))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self(DEFAULT_BATCH_SIZE)
    }
}

impl fmt::Display for BatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sleep intervals used to throttle polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Wait between attempts to pop from an empty queue.
    pub queue: Duration,

    /// Wait before each convergence poll of a router.
    pub poll: Duration,

    /// Wait between checks of a batch's completion count.
    pub batch: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            queue: Duration::from_secs(1),
            poll: Duration::from_secs(1),
            batch: Duration::from_secs(5),
        }
    }
}

/// Settings for a batch rebuild run.
#[derive(Debug, Clone)]
pub struct RebuildConfig {
    /// Routers per batch; also the requested worker pool size.
    pub batch_size: BatchSize,

    /// Image id routers should end up running.
    pub target_image_id: String,

    pub intervals: PollIntervals,
}

impl RebuildConfig {
    pub fn new(batch_size: BatchSize, target_image_id: impl Into<String>) -> Self {
        Self {
            batch_size,
            target_image_id: target_image_id.into(),
            intervals: PollIntervals::default(),
        }
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }
}
