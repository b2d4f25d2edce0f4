//! Stats Module - Epoch Statistics
//!
//! Every collection epoch gets a record that the collector fills in as the
//! epoch moves through its lifecycle: scheduled, started, marked, swept,
//! finished, finalized. Records live in a bounded history; totals survive
//! eviction.

pub mod handle;
pub mod timer;

pub use handle::{GcHandle, SweepCounts};
pub use timer::GcTimer;

use crate::gc::Epoch;
use crate::logging::GcLogger;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for a single epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: Epoch,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started: bool,
    pub threads_suspended: usize,
    pub marked: usize,
    pub swept: usize,
    pub kept: usize,
    pub finalizable: usize,
    pub extra_swept: usize,
    /// Stop-the-world duration in nanoseconds
    pub pause_ns: u64,
    pub finished: bool,
    pub finalized: usize,
    pub finalizer_failures: usize,
    pub finalizers_done: bool,
}

impl EpochStats {
    fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }
}

/// Aggregate counters across all epochs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcSummary {
    pub epochs_finished: u64,
    pub objects_swept: u64,
    pub finalizers_run: u64,
    pub finalizer_failures: u64,
    pub last_epoch: Option<Epoch>,
}

/// GcStatistics - per-instance statistics repository
pub struct GcStatistics {
    history: usize,
    epochs: RwLock<IndexMap<Epoch, EpochStats>>,
    epochs_finished: AtomicU64,
    objects_swept: AtomicU64,
    finalizers_run: AtomicU64,
    finalizer_failures: AtomicU64,
    logger: GcLogger,
}

impl GcStatistics {
    /// Create statistics keeping at most `history` epoch records
    pub fn new(history: usize, logger: GcLogger) -> Self {
        Self {
            history: history.max(1),
            epochs: RwLock::new(IndexMap::new()),
            epochs_finished: AtomicU64::new(0),
            objects_swept: AtomicU64::new(0),
            finalizers_run: AtomicU64::new(0),
            finalizer_failures: AtomicU64::new(0),
            logger,
        }
    }

    /// Handle for recording one epoch's lifecycle
    pub fn handle(&self, epoch: Epoch) -> GcHandle<'_> {
        GcHandle::new(epoch, self)
    }

    /// Event logger
    pub fn logger(&self) -> &GcLogger {
        &self.logger
    }

    /// Record for `epoch`, if still in the history
    pub fn epoch(&self, epoch: Epoch) -> Option<EpochStats> {
        self.epochs.read().get(&epoch).cloned()
    }

    /// Most recently created record
    pub fn last_epoch(&self) -> Option<EpochStats> {
        self.epochs.read().last().map(|(_, stats)| stats.clone())
    }

    /// Number of records held
    pub fn recorded_epochs(&self) -> usize {
        self.epochs.read().len()
    }

    /// Aggregate counters
    pub fn summary(&self) -> GcSummary {
        GcSummary {
            epochs_finished: self.epochs_finished.load(Ordering::Relaxed),
            objects_swept: self.objects_swept.load(Ordering::Relaxed),
            finalizers_run: self.finalizers_run.load(Ordering::Relaxed),
            finalizer_failures: self.finalizer_failures.load(Ordering::Relaxed),
            last_epoch: self.epochs.read().last().map(|(epoch, _)| *epoch),
        }
    }

    /// Render the history as JSON
    pub fn to_json(&self) -> String {
        let epochs: Vec<EpochStats> = self.epochs.read().values().cloned().collect();
        serde_json::to_string(&epochs).unwrap_or_else(|_| "[]".to_string())
    }

    /// Reset all records, totals and logged events
    pub fn clear(&self) {
        self.epochs.write().clear();
        self.epochs_finished.store(0, Ordering::Relaxed);
        self.objects_swept.store(0, Ordering::Relaxed);
        self.finalizers_run.store(0, Ordering::Relaxed);
        self.finalizer_failures.store(0, Ordering::Relaxed);
        self.logger.clear();
    }

    pub(crate) fn update(&self, epoch: Epoch, f: impl FnOnce(&mut EpochStats)) {
        let mut epochs = self.epochs.write();
        if !epochs.contains_key(&epoch) {
            while epochs.len() >= self.history {
                epochs.shift_remove_index(0);
            }
        }
        f(epochs.entry(epoch).or_insert_with(|| EpochStats::new(epoch)));
    }

    pub(crate) fn add_finished(&self) {
        self.epochs_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_swept(&self, count: usize) {
        self.objects_swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_finalized(&self, finalized: usize, failed: usize) {
        self.finalizers_run.fetch_add(finalized as u64, Ordering::Relaxed);
        self.finalizer_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }
}

impl Default for GcStatistics {
    fn default() -> Self {
        Self::new(64, GcLogger::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_evicts_oldest() {
        let stats = GcStatistics::new(2, GcLogger::default());
        stats.handle(1).scheduled();
        stats.handle(2).scheduled();
        stats.handle(3).scheduled();

        assert_eq!(stats.recorded_epochs(), 2);
        assert!(stats.epoch(1).is_none());
        assert_eq!(stats.last_epoch().map(|s| s.epoch), Some(3));
    }

    #[test]
    fn test_totals_survive_eviction() {
        let stats = GcStatistics::new(1, GcLogger::default());
        stats.handle(1).swept(SweepCounts {
            swept: 5,
            ..Default::default()
        });
        stats.handle(2).swept(SweepCounts {
            swept: 2,
            ..Default::default()
        });

        assert_eq!(stats.summary().objects_swept, 7);
        assert_eq!(stats.recorded_epochs(), 1);
    }

    #[test]
    fn test_clear_resets_everything() {
        let stats = GcStatistics::default();
        let handle = stats.handle(1);
        handle.scheduled();
        handle.finalizers_done(3, 1);
        stats.clear();

        assert_eq!(stats.summary(), GcSummary::default());
        assert_eq!(stats.logger().event_count(), 0);
    }

    #[test]
    fn test_json_export() {
        let stats = GcStatistics::default();
        stats.handle(9).marked(12);
        let parsed: Vec<EpochStats> = serde_json::from_str(&stats.to_json()).unwrap();
        assert_eq!(parsed[0].epoch, 9);
        assert_eq!(parsed[0].marked, 12);
    }
}
