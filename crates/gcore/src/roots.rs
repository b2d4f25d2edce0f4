//! Root Scanning - entry points of the mark phase
//!
//! What counts as a root (stack slots, globals, handles held by native
//! code) belongs to the embedding runtime. It reports roots through the
//! [`RootScanner`] trait by feeding each root slot to the mark callbacks.
//!
//! [`GlobalRoots`] is a ready-made scanner over explicitly registered
//! slots, enough for runtimes whose roots are all handles.
//!
//! # Thread Safety
//!
//! Slots may be registered and updated from any thread. Scanning happens
//! with the world stopped.

use crate::gc::mark::{MarkCallbacks, MarkState};
use crate::object::header::to_raw;
use crate::object::{ObjHeader, ObjRef};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// External tracer boundary
///
/// Implementations call one of the callbacks for every root.
pub trait RootScanner: Send + Sync {
    fn scan_roots(&self, state: &mut MarkState, callbacks: &MarkCallbacks);
}

/// Identifies one registered root slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHandle(u64);

struct RootSlot {
    name: Option<String>,
    slot: AtomicPtr<ObjHeader>,
}

/// GlobalRoots - registrable root slots
///
/// # Examples
///
/// ```rust
/// use gcore::roots::GlobalRoots;
///
/// let roots = GlobalRoots::new();
/// let handle = roots.register(None);
/// assert_eq!(roots.len(), 1);
/// assert!(roots.get(handle).is_none());
/// roots.unregister(handle);
/// assert!(roots.is_empty());
/// ```
pub struct GlobalRoots {
    slots: Mutex<IndexMap<u64, RootSlot>>,
    next_id: AtomicU64,
}

impl GlobalRoots {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a root slot holding `obj`
    pub fn register(&self, obj: Option<ObjRef>) -> RootHandle {
        self.insert(None, obj)
    }

    /// Register a root slot with a debugging name
    pub fn register_named(&self, name: &str, obj: Option<ObjRef>) -> RootHandle {
        self.insert(Some(name.to_string()), obj)
    }

    fn insert(&self, name: Option<String>, obj: Option<ObjRef>) -> RootHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(
            id,
            RootSlot {
                name,
                slot: AtomicPtr::new(to_raw(obj)),
            },
        );
        RootHandle(id)
    }

    /// Point the slot at `obj`; unknown handles are ignored
    pub fn set(&self, handle: RootHandle, obj: Option<ObjRef>) {
        if let Some(root) = self.slots.lock().get(&handle.0) {
            root.slot.store(to_raw(obj), Ordering::Release);
        }
    }

    pub fn get(&self, handle: RootHandle) -> Option<ObjRef> {
        let slots = self.slots.lock();
        let raw = slots.get(&handle.0)?.slot.load(Ordering::Acquire);
        // SAFETY: root slots only hold null or live objects
        unsafe { ObjRef::from_raw(raw) }
    }

    pub fn clear(&self, handle: RootHandle) {
        self.set(handle, None);
    }

    pub fn unregister(&self, handle: RootHandle) {
        self.slots.lock().shift_remove(&handle.0);
    }

    pub fn name(&self, handle: RootHandle) -> Option<String> {
        self.slots.lock().get(&handle.0)?.name.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl Default for GlobalRoots {
    fn default() -> Self {
        Self::new()
    }
}

impl RootScanner for GlobalRoots {
    fn scan_roots(&self, state: &mut MarkState, callbacks: &MarkCallbacks) {
        for root in self.slots.lock().values() {
            (callbacks.process_field)(state, &root.slot);
        }
    }
}

/// Scanner with no roots; every object is garbage
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRoots;

impl RootScanner for NoRoots {
    fn scan_roots(&self, _state: &mut MarkState, _callbacks: &MarkCallbacks) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_set_clear() {
        let roots = GlobalRoots::new();
        let a = roots.register(None);
        let b = roots.register_named("main", None);

        assert_ne!(a, b);
        assert_eq!(roots.name(b).as_deref(), Some("main"));
        assert!(roots.name(a).is_none());

        roots.clear(a);
        assert!(roots.get(a).is_none());

        roots.unregister(a);
        assert_eq!(roots.len(), 1);
        assert!(roots.get(a).is_none());
    }

    #[test]
    fn test_scan_visits_every_slot() {
        static VISITED: AtomicU64 = AtomicU64::new(0);

        fn count_field(_: &mut MarkState, slot: &AtomicPtr<ObjHeader>) {
            assert!(slot.load(Ordering::Relaxed).is_null());
            VISITED.fetch_add(1, Ordering::Relaxed);
        }
        fn ignore_object(_: &mut MarkState, _: ObjRef) {}
        fn ignore_array(_: &mut MarkState, _: crate::object::ArrayRef) {}

        let roots = GlobalRoots::new();
        roots.register(None);
        roots.register(None);

        let callbacks = MarkCallbacks {
            process_object: ignore_object,
            process_array: ignore_array,
            process_field: count_field,
        };
        let mut state = MarkState::new(1, 4);
        roots.scan_roots(&mut state, &callbacks);
        assert_eq!(VISITED.load(Ordering::Relaxed), 2);
    }
}
