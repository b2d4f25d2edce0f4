//! GC Logging
//!
//! Epoch lifecycle events, forwarded to the `log` facade under the `gc`
//! target and kept in memory so tests and diagnostics can inspect them.
//!
//! Log Levels:
//! - ERROR: finalizer failures
//! - INFO: collector initialization
//! - DEBUG: epoch milestones (INFO with `GcConfig::verbose`)
//! - TRACE: thread suspension

use crate::gc::Epoch;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Log target used by every collector message
pub const LOG_TARGET: &str = "gc";

/// GC event types
#[derive(Debug, Clone, PartialEq)]
pub enum GcEvent {
    /// A strategy was constructed
    CollectorInitialized { collector: &'static str },

    /// An epoch number was handed out
    EpochScheduled { epoch: Epoch },

    /// The collection for an epoch began
    EpochStarted { epoch: Epoch },

    /// All mutators reached a safepoint or native state
    ThreadsSuspended { epoch: Epoch, threads: usize },

    /// Mark phase completed
    MarkFinished { epoch: Epoch, marked: usize },

    /// Sweep phase completed
    SweepFinished {
        epoch: Epoch,
        swept: usize,
        kept: usize,
        finalizable: usize,
        extra_swept: usize,
    },

    /// Marking and sweeping done, mutators resumed
    EpochFinished { epoch: Epoch, duration_ms: f64 },

    /// Finalizer batch for an epoch completed
    FinalizersFinished {
        epoch: Epoch,
        finalized: usize,
        failed: usize,
    },

    /// A single finalizer panicked
    FinalizerFailed { epoch: Epoch, type_name: &'static str },
}

impl GcEvent {
    /// Epoch the event belongs to, if any
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            GcEvent::CollectorInitialized { .. } => None,
            GcEvent::EpochScheduled { epoch }
            | GcEvent::EpochStarted { epoch }
            | GcEvent::ThreadsSuspended { epoch, .. }
            | GcEvent::MarkFinished { epoch, .. }
            | GcEvent::SweepFinished { epoch, .. }
            | GcEvent::EpochFinished { epoch, .. }
            | GcEvent::FinalizersFinished { epoch, .. }
            | GcEvent::FinalizerFailed { epoch, .. } => Some(*epoch),
        }
    }

    fn level(&self, cycle_level: log::Level) -> log::Level {
        match self {
            GcEvent::FinalizerFailed { .. } => log::Level::Error,
            GcEvent::CollectorInitialized { .. } => log::Level::Info,
            GcEvent::ThreadsSuspended { .. } => log::Level::Trace,
            _ => cycle_level,
        }
    }

    /// JSON rendering used by diagnostics dumps
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            GcEvent::CollectorInitialized { collector } => serde_json::json!({
                "event": "collector_initialized",
                "collector": collector,
            }),
            GcEvent::EpochScheduled { epoch } => serde_json::json!({
                "event": "epoch_scheduled",
                "epoch": epoch,
            }),
            GcEvent::EpochStarted { epoch } => serde_json::json!({
                "event": "epoch_started",
                "epoch": epoch,
            }),
            GcEvent::ThreadsSuspended { epoch, threads } => serde_json::json!({
                "event": "threads_suspended",
                "epoch": epoch,
                "threads": threads,
            }),
            GcEvent::MarkFinished { epoch, marked } => serde_json::json!({
                "event": "mark_finished",
                "epoch": epoch,
                "marked": marked,
            }),
            GcEvent::SweepFinished {
                epoch,
                swept,
                kept,
                finalizable,
                extra_swept,
            } => serde_json::json!({
                "event": "sweep_finished",
                "epoch": epoch,
                "swept": swept,
                "kept": kept,
                "finalizable": finalizable,
                "extra_swept": extra_swept,
            }),
            GcEvent::EpochFinished { epoch, duration_ms } => serde_json::json!({
                "event": "epoch_finished",
                "epoch": epoch,
                "duration_ms": duration_ms,
            }),
            GcEvent::FinalizersFinished {
                epoch,
                finalized,
                failed,
            } => serde_json::json!({
                "event": "finalizers_finished",
                "epoch": epoch,
                "finalized": finalized,
                "failed": failed,
            }),
            GcEvent::FinalizerFailed { epoch, type_name } => serde_json::json!({
                "event": "finalizer_failed",
                "epoch": epoch,
                "type": type_name,
            }),
        }
    }
}

impl fmt::Display for GcEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcEvent::CollectorInitialized { collector } => {
                write!(f, "{} collector initialized", collector)
            },
            GcEvent::EpochScheduled { epoch } => write!(f, "Epoch #{}: scheduled", epoch),
            GcEvent::EpochStarted { epoch } => write!(f, "Epoch #{}: started", epoch),
            GcEvent::ThreadsSuspended { epoch, threads } => {
                write!(f, "Epoch #{}: suspended {} threads", epoch, threads)
            },
            GcEvent::MarkFinished { epoch, marked } => {
                write!(f, "Epoch #{}: marked {} objects", epoch, marked)
            },
            GcEvent::SweepFinished {
                epoch,
                swept,
                kept,
                finalizable,
                extra_swept,
            } => write!(
                f,
                "Epoch #{}: swept {} objects, kept {}, {} queued for finalization, {} extra objects swept",
                epoch, swept, kept, finalizable, extra_swept
            ),
            GcEvent::EpochFinished { epoch, duration_ms } => {
                write!(f, "Epoch #{}: finished in {:.3}ms", epoch, duration_ms)
            },
            GcEvent::FinalizersFinished {
                epoch,
                finalized,
                failed,
            } => write!(
                f,
                "Epoch #{}: finalized {} objects ({} failed)",
                epoch, finalized, failed
            ),
            GcEvent::FinalizerFailed { epoch, type_name } => {
                write!(f, "Epoch #{}: finalizer for {} panicked", epoch, type_name)
            },
        }
    }
}

/// Recorded event with its wall-clock timestamp
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub at: DateTime<Utc>,
    pub event: GcEvent,
}

/// GC Logger - per-instance event sink
///
/// Every GC instance owns one; nothing here is process-global, so
/// independent runtimes in the same test binary do not see each other's
/// events.
pub struct GcLogger {
    cycle_level: log::Level,
    events: Mutex<Vec<LoggedEvent>>,
    enabled: AtomicBool,
}

impl GcLogger {
    /// Create logger emitting epoch milestones at `cycle_level`
    pub fn new(cycle_level: log::Level) -> Self {
        Self {
            cycle_level,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Enable recording
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable recording (events are still forwarded to `log`)
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Log a GC event
    pub fn log(&self, event: GcEvent) {
        log::log!(target: LOG_TARGET, event.level(self.cycle_level), "{}", event);

        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }

        self.events.lock().push(LoggedEvent {
            at: Utc::now(),
            event,
        });
    }

    /// Number of recorded events
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().clone()
    }

    /// Recorded events for one epoch, in order
    pub fn events_for(&self, epoch: Epoch) -> Vec<GcEvent> {
        self.events
            .lock()
            .iter()
            .filter(|logged| logged.event.epoch() == Some(epoch))
            .map(|logged| logged.event.clone())
            .collect()
    }

    /// Render recorded events as a JSON array
    pub fn to_json(&self) -> String {
        let events: Vec<serde_json::Value> = self
            .events
            .lock()
            .iter()
            .map(|logged| {
                let mut value = logged.event.to_json();
                value["at"] = serde_json::Value::String(logged.at.to_rfc3339());
                value
            })
            .collect();
        serde_json::Value::Array(events).to_string()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(log::Level::Debug)
    }
}
