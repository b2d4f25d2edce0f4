//! Safepoint Management
//!
//! A safepoint is a point where a mutator can be stopped for collection.
//! Mutators poll [`SafepointManager::is_requested`] at their safepoints and
//! park when a collection asks for it.
//!
//! ## Suspension protocol
//!
//! ```text
//! collector                         mutator
//! ─────────                         ───────
//! request (requested = true)
//!   wait until every thread   <──   safe_point(): publish, park
//!   is parked or native               (suspended = true)
//! mark / sweep
//! release (requested = false) ──>   wake (suspended = false)
//! ```
//!
//! The poll is a single atomic load. Every other transition happens under
//! the thread registry lock, so a request can never miss a thread that is
//! in the middle of changing state.

use super::thread_registry::MutatorState;
use parking_lot::{Condvar, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// SafepointManager - suspension request flag and wakeups
pub struct SafepointManager {
    /// Suspension requested by a collector
    requested: AtomicBool,

    /// Signalled on every thread state change
    changed: Condvar,

    /// Completed suspensions
    suspensions: AtomicU64,

    /// Bumped on every release; a parked thread waits for the next one
    releases: AtomicU64,
}

impl SafepointManager {
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            changed: Condvar::new(),
            suspensions: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// Check if mutators should park
    ///
    /// Called from every safepoint; must stay a single load.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Number of stop-the-world windows opened so far
    pub fn suspension_count(&self) -> u64 {
        self.suspensions.load(Ordering::Relaxed)
    }

    /// Raise the request and wait until `quiescent` holds
    pub(crate) fn request<T>(&self, guard: &mut MutexGuard<'_, T>, quiescent: impl Fn(&T) -> bool) {
        crate::runtime_assert!(
            !self.requested.swap(true, Ordering::AcqRel),
            "nested suspension request"
        );
        while !quiescent(&**guard) {
            self.changed.wait(guard);
        }
        self.suspensions.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop the request and wake parked threads
    pub(crate) fn release<T>(&self, _guard: &mut MutexGuard<'_, T>) {
        self.releases.fetch_add(1, Ordering::AcqRel);
        self.requested.store(false, Ordering::Release);
        self.changed.notify_all();
    }

    /// Park `mutator` until the current request is released
    ///
    /// Returns after the release even if the next request is already up,
    /// so the thread parks (and is counted) once per collection.
    pub(crate) fn park<T>(&self, guard: &mut MutexGuard<'_, T>, mutator: &MutatorState) {
        if !self.is_requested() {
            return;
        }
        let releases = self.releases.load(Ordering::Acquire);
        mutator.set_suspended(true);
        self.changed.notify_all();
        while self.is_requested() && self.releases.load(Ordering::Acquire) == releases {
            self.changed.wait(guard);
        }
        mutator.set_suspended(false);
    }

    /// Block while a request is in effect
    pub(crate) fn wait_while_requested<T>(&self, guard: &mut MutexGuard<'_, T>) {
        while self.is_requested() {
            self.changed.wait(guard);
        }
    }

    /// Wake everyone waiting on a state change
    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }
}

impl Default for SafepointManager {
    fn default() -> Self {
        Self::new()
    }
}
