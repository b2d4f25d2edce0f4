//! GC Scheduler - trigger-policy boundary
//!
//! Deciding *when* to collect is not the collector's business. A
//! scheduler calls `Gc::schedule()` according to its own heuristics and is
//! told when each epoch starts and finishes.

use crate::gc::Epoch;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Trigger-policy collaborator
pub trait GcScheduler: Send + Sync {
    /// Collection for `epoch` started
    fn on_gc_start(&self, epoch: Epoch) {
        let _ = epoch;
    }

    /// Marking and sweeping for `epoch` finished, `alive_bytes` survived
    fn on_gc_finish(&self, epoch: Epoch, alive_bytes: usize) {
        let _ = (epoch, alive_bytes);
    }
}

/// ManualScheduler - no policy; collections happen only on request
///
/// Remembers the outcome of the last epoch for inspection.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    last_started: AtomicU64,
    last_finished: AtomicU64,
    alive_bytes: AtomicUsize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_started(&self) -> Epoch {
        self.last_started.load(Ordering::Acquire)
    }

    pub fn last_finished(&self) -> Epoch {
        self.last_finished.load(Ordering::Acquire)
    }

    /// Bytes alive after the last finished epoch
    pub fn alive_bytes(&self) -> usize {
        self.alive_bytes.load(Ordering::Acquire)
    }
}

impl GcScheduler for ManualScheduler {
    fn on_gc_start(&self, epoch: Epoch) {
        self.last_started.store(epoch, Ordering::Release);
    }

    fn on_gc_finish(&self, epoch: Epoch, alive_bytes: usize) {
        self.alive_bytes.store(alive_bytes, Ordering::Release);
        self.last_finished.store(epoch, Ordering::Release);
    }
}
