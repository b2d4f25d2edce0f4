//! GcHandle - epoch lifecycle recorder
//!
//! The collector reports each milestone of an epoch through a handle; the
//! handle updates the epoch record and emits the matching [`GcEvent`].

use super::{GcStatistics, GcTimer};
use crate::gc::Epoch;
use crate::logging::GcEvent;
use chrono::Utc;

/// Sweep phase counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounts {
    /// Objects freed during the sweep
    pub swept: usize,
    /// Objects that survived
    pub kept: usize,
    /// Objects handed to the finalizer worker
    pub finalizable: usize,
    /// Extra object data records freed
    pub extra_swept: usize,
}

/// Handle on one epoch's statistics record
pub struct GcHandle<'a> {
    epoch: Epoch,
    stats: &'a GcStatistics,
}

impl<'a> GcHandle<'a> {
    pub(crate) fn new(epoch: Epoch, stats: &'a GcStatistics) -> Self {
        Self { epoch, stats }
    }

    /// Epoch this handle records
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn scheduled(&self) {
        self.stats
            .update(self.epoch, |record| record.scheduled_at = Some(Utc::now()));
        self.stats
            .logger()
            .log(GcEvent::EpochScheduled { epoch: self.epoch });
    }

    pub fn started(&self) {
        self.stats.update(self.epoch, |record| record.started = true);
        self.stats
            .logger()
            .log(GcEvent::EpochStarted { epoch: self.epoch });
    }

    pub fn threads_suspended(&self, threads: usize) {
        self.stats
            .update(self.epoch, |record| record.threads_suspended = threads);
        self.stats.logger().log(GcEvent::ThreadsSuspended {
            epoch: self.epoch,
            threads,
        });
    }

    pub fn marked(&self, marked: usize) {
        self.stats.update(self.epoch, |record| record.marked = marked);
        self.stats.logger().log(GcEvent::MarkFinished {
            epoch: self.epoch,
            marked,
        });
    }

    pub fn swept(&self, counts: SweepCounts) {
        self.stats.update(self.epoch, |record| {
            record.swept = counts.swept;
            record.kept = counts.kept;
            record.finalizable = counts.finalizable;
            record.extra_swept = counts.extra_swept;
        });
        self.stats.add_swept(counts.swept);
        self.stats.logger().log(GcEvent::SweepFinished {
            epoch: self.epoch,
            swept: counts.swept,
            kept: counts.kept,
            finalizable: counts.finalizable,
            extra_swept: counts.extra_swept,
        });
    }

    /// Marking and sweeping are complete; `timer` measured the pause
    pub fn finished(&self, timer: &GcTimer) {
        let pause_ns = timer.elapsed_ns();
        self.stats.update(self.epoch, |record| {
            record.finished = true;
            record.pause_ns = pause_ns;
        });
        self.stats.add_finished();
        self.stats.logger().log(GcEvent::EpochFinished {
            epoch: self.epoch,
            duration_ms: timer.elapsed_ms(),
        });
    }

    pub fn finalizer_failed(&self, type_name: &'static str) {
        self.stats.logger().log(GcEvent::FinalizerFailed {
            epoch: self.epoch,
            type_name,
        });
    }

    pub fn finalizers_done(&self, finalized: usize, failed: usize) {
        self.stats.update(self.epoch, |record| {
            record.finalized = finalized;
            record.finalizer_failures = failed;
            record.finalizers_done = true;
        });
        self.stats.add_finalized(finalized, failed);
        self.stats.logger().log(GcEvent::FinalizersFinished {
            epoch: self.epoch,
            finalized,
            failed,
        });
    }
}
