//! Thread Registry - registered mutator threads
//!
//! The registry is an ordinary owned value shared through `Arc`; several
//! independent runtimes can coexist in one process.

use super::safepoint::SafepointManager;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Execution state of a mutator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Running managed code; must reach a safepoint before collection
    Runnable,
    /// Outside managed code with its queues published; no need to stop
    Native,
}

/// Registry entry for one mutator thread
#[derive(Debug)]
pub struct MutatorState {
    id: usize,
    thread: ThreadId,
    state: AtomicU8,
    suspended: AtomicBool,
}

const RUNNABLE: u8 = 0;
const NATIVE: u8 = 1;

impl MutatorState {
    fn new(id: usize) -> Self {
        Self {
            id,
            thread: thread::current().id(),
            state: AtomicU8::new(RUNNABLE),
            suspended: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// OS thread that registered this entry
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn state(&self) -> ThreadState {
        match self.state.load(Ordering::Acquire) {
            NATIVE => ThreadState::Native,
            _ => ThreadState::Runnable,
        }
    }

    fn set_state(&self, state: ThreadState) {
        let raw = match state {
            ThreadState::Runnable => RUNNABLE,
            ThreadState::Native => NATIVE,
        };
        self.state.store(raw, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    pub(crate) fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    /// Whether a collection may proceed without this thread's cooperation
    pub fn is_quiescent(&self) -> bool {
        self.is_suspended() || self.state() == ThreadState::Native
    }
}

/// ThreadRegistry - enumeration and suspension of mutator threads
pub struct ThreadRegistry {
    threads: Mutex<IndexMap<usize, Arc<MutatorState>>>,
    next_id: AtomicUsize,
    safepoints: SafepointManager,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(IndexMap::new()),
            next_id: AtomicUsize::new(1),
            safepoints: SafepointManager::new(),
        }
    }

    /// Register the calling thread as a runnable mutator
    ///
    /// Blocks while a collection has threads suspended.
    pub fn register(&self) -> Arc<MutatorState> {
        let mut threads = self.threads.lock();
        self.safepoints.wait_while_requested(&mut threads);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mutator = Arc::new(MutatorState::new(id));
        threads.insert(id, mutator.clone());
        mutator
    }

    pub fn unregister(&self, mutator: &MutatorState) {
        let mut threads = self.threads.lock();
        threads.shift_remove(&mutator.id);
        self.safepoints.notify();
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// Snapshot of registered threads, in registration order
    pub fn threads(&self) -> Vec<Arc<MutatorState>> {
        self.threads.lock().values().cloned().collect()
    }

    pub fn safepoints(&self) -> &SafepointManager {
        &self.safepoints
    }

    /// Whether `thread` is registered and currently runnable
    pub fn is_runnable_mutator(&self, thread: ThreadId) -> bool {
        self.threads
            .lock()
            .values()
            .any(|mutator| mutator.thread == thread && mutator.state() == ThreadState::Runnable)
    }

    /// Stop the world
    ///
    /// Returns once every registered thread is parked or native, with the
    /// number of registered threads.
    pub fn suspend_threads(&self) -> usize {
        let mut threads = self.threads.lock();
        self.safepoints.request(&mut threads, |threads| {
            threads.values().all(|mutator| mutator.is_quiescent())
        });
        log::trace!(target: "gc", "{} threads stopped", threads.len());
        threads.len()
    }

    /// Restart the world
    ///
    /// Parked threads count as running again at once, so a following
    /// request waits for them to park anew.
    pub fn resume_threads(&self) {
        let mut threads = self.threads.lock();
        for mutator in threads.values() {
            mutator.set_suspended(false);
        }
        self.safepoints.release(&mut threads);
    }

    /// Park the calling mutator until the current suspension ends
    pub(crate) fn suspend_current(&self, mutator: &MutatorState) {
        let mut threads = self.threads.lock();
        self.safepoints.park(&mut threads, mutator);
    }

    /// Leave managed code; the caller must have published its queues
    pub(crate) fn enter_native(&self, mutator: &MutatorState) {
        let _threads = self.threads.lock();
        mutator.set_state(ThreadState::Native);
        self.safepoints.notify();
    }

    /// Return to managed code, waiting out any suspension in effect
    pub(crate) fn leave_native(&self, mutator: &MutatorState) {
        let mut threads = self.threads.lock();
        self.safepoints.wait_while_requested(&mut threads);
        mutator.set_state(ThreadState::Runnable);
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn test_register_and_unregister() {
        let registry = ThreadRegistry::new();
        let a = registry.register();
        let b = registry.register();

        assert_ne!(a.id(), b.id());
        assert_eq!(registry.thread_count(), 2);
        assert!(registry.is_runnable_mutator(thread::current().id()));

        registry.unregister(&a);
        registry.unregister(&b);
        assert_eq!(registry.thread_count(), 0);
        assert!(!registry.is_runnable_mutator(thread::current().id()));
    }

    #[test]
    fn test_native_threads_do_not_block_suspension() {
        let registry = ThreadRegistry::new();
        let mutator = registry.register();
        registry.enter_native(&mutator);

        assert_eq!(registry.suspend_threads(), 1);
        assert!(registry.safepoints().is_requested());
        registry.resume_threads();

        registry.leave_native(&mutator);
        assert_eq!(mutator.state(), ThreadState::Runnable);
    }

    #[test]
    fn test_suspension_waits_for_runnable_thread() {
        let registry = Arc::new(ThreadRegistry::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let registry = registry.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mutator = registry.register();
                while !stop.load(Ordering::Acquire) {
                    if registry.safepoints().is_requested() {
                        registry.suspend_current(&mutator);
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                registry.unregister(&mutator);
            })
        };

        while registry.thread_count() == 0 {
            thread::yield_now();
        }

        assert_eq!(registry.suspend_threads(), 1);
        assert!(registry.threads()[0].is_suspended());
        registry.resume_threads();

        stop.store(true, Ordering::Release);
        worker.join().unwrap();
    }

    #[test]
    fn test_back_to_back_requests_park_thread_twice() {
        let registry = Arc::new(ThreadRegistry::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let registry = registry.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mutator = registry.register();
                let mut parks = 0;
                while !stop.load(Ordering::Acquire) {
                    if registry.safepoints().is_requested() {
                        registry.suspend_current(&mutator);
                        parks += 1;
                    }
                    thread::yield_now();
                }
                registry.unregister(&mutator);
                parks
            })
        };

        while registry.thread_count() == 0 {
            thread::yield_now();
        }

        registry.suspend_threads();
        registry.resume_threads();
        registry.suspend_threads();
        registry.resume_threads();

        stop.store(true, Ordering::Release);
        assert_eq!(worker.join().unwrap(), 2);
        assert_eq!(registry.safepoints().suspension_count(), 2);
    }
}
