//! Epoch State - scheduling and completion tracking
//!
//! Every collection request gets an epoch number. The holder tracks four
//! watermarks which only ever grow:
//!
//! ```text
//! finalized <= finished <= started <= scheduled
//! ```
//!
//! Waiters block on a condition variable until the watermark they care
//! about reaches their epoch.

use super::Epoch;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default, Clone, Copy)]
struct Epochs {
    scheduled: Epoch,
    started: Epoch,
    finished: Epoch,
    finalized: Epoch,
    shutdown: bool,
}

/// GcStateHolder - epoch scheduler
pub struct GcStateHolder {
    epochs: Mutex<Epochs>,
    changed: Condvar,
}

impl GcStateHolder {
    pub fn new() -> Self {
        Self {
            epochs: Mutex::new(Epochs::default()),
            changed: Condvar::new(),
        }
    }

    /// Request a collection
    ///
    /// Returns the pending epoch when one is scheduled but not yet started,
    /// otherwise schedules the epoch after the last started one.
    pub fn schedule(&self) -> Epoch {
        self.schedule_tracked().0
    }

    /// Like [`Self::schedule`], also reporting whether a new epoch was created
    pub(crate) fn schedule_tracked(&self) -> (Epoch, bool) {
        let mut epochs = self.epochs.lock();
        if epochs.scheduled <= epochs.started {
            epochs.scheduled = epochs.started + 1;
            self.changed.notify_all();
            return (epochs.scheduled, true);
        }
        (epochs.scheduled, false)
    }

    pub fn start(&self, epoch: Epoch) {
        let mut epochs = self.epochs.lock();
        crate::runtime_assert!(
            epoch > epochs.started,
            "epoch {} started after epoch {}",
            epoch,
            epochs.started
        );
        epochs.started = epoch;
        epochs.scheduled = epochs.scheduled.max(epoch);
        self.changed.notify_all();
    }

    pub fn finish(&self, epoch: Epoch) {
        let mut epochs = self.epochs.lock();
        crate::runtime_assert!(
            epoch <= epochs.started,
            "epoch {} finished before it started",
            epoch
        );
        epochs.finished = epochs.finished.max(epoch);
        self.changed.notify_all();
    }

    pub fn finalized(&self, epoch: Epoch) {
        let mut epochs = self.epochs.lock();
        crate::runtime_assert!(
            epoch <= epochs.finished,
            "epoch {} finalized before it finished",
            epoch
        );
        epochs.finalized = epochs.finalized.max(epoch);
        self.changed.notify_all();
    }

    /// Block until marking and sweeping of `epoch` completed
    pub fn wait_epoch_finished(&self, epoch: Epoch) {
        let mut epochs = self.epochs.lock();
        while epochs.finished < epoch && !epochs.shutdown {
            self.changed.wait(&mut epochs);
        }
    }

    /// Block until the finalizers of `epoch` ran
    pub fn wait_epoch_finalized(&self, epoch: Epoch) {
        let mut epochs = self.epochs.lock();
        while epochs.finalized < epoch && !epochs.shutdown {
            self.changed.wait(&mut epochs);
        }
    }

    /// Release every waiter; no epoch will complete after this
    pub fn shutdown(&self) {
        self.epochs.lock().shutdown = true;
        self.changed.notify_all();
    }

    pub fn scheduled_epoch(&self) -> Epoch {
        self.epochs.lock().scheduled
    }

    pub fn started_epoch(&self) -> Epoch {
        self.epochs.lock().started
    }

    pub fn finished_epoch(&self) -> Epoch {
        self.epochs.lock().finished
    }

    pub fn finalized_epoch(&self) -> Epoch {
        self.epochs.lock().finalized
    }

    pub fn is_shutdown(&self) -> bool {
        self.epochs.lock().shutdown
    }
}

impl Default for GcStateHolder {
    fn default() -> Self {
        Self::new()
    }
}
