//! Mark Traversal - callback protocol between tracer and collector
//!
//! A tracer walks the object graph and reports what it visits through
//! three callbacks:
//!
//! - `process_object`: an object found reachable
//! - `process_array`: an array found reachable
//! - `process_field`: a reference slot read from a reachable parent
//!
//! The collector answers by setting mark bits. Objects marked for the first
//! time are queued in the [`MarkState`] so their references get visited;
//! already marked objects are skipped, which is what terminates traversal
//! of cyclic graphs.

use super::{Collector, Epoch};
use crate::object::{ArrayRef, ObjHeader, ObjRef};
use std::sync::atomic::AtomicPtr;

/// Per-traversal mark state
///
/// Owned by the thread running the mark phase.
pub struct MarkState {
    epoch: Epoch,
    stack: Vec<ObjRef>,
    marked: usize,
}

impl MarkState {
    pub fn new(epoch: Epoch, capacity: usize) -> Self {
        Self {
            epoch,
            stack: Vec::with_capacity(capacity),
            marked: 0,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Objects marked so far
    pub fn marked(&self) -> usize {
        self.marked
    }

    /// Objects waiting to have their references visited
    pub fn pending(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Record a newly marked object whose references must be visited
    pub(crate) fn enqueue(&mut self, obj: ObjRef) {
        self.marked += 1;
        self.stack.push(obj);
    }

    /// Record a newly marked object without references
    pub(crate) fn record_leaf(&mut self) {
        self.marked += 1;
    }

    fn pop(&mut self) -> Option<ObjRef> {
        self.stack.pop()
    }
}

/// Mark callbacks handed to a [`RootScanner`](crate::roots::RootScanner)
#[derive(Clone, Copy)]
pub struct MarkCallbacks {
    pub process_object: fn(&mut MarkState, ObjRef),
    pub process_array: fn(&mut MarkState, ArrayRef),
    pub process_field: fn(&mut MarkState, &AtomicPtr<ObjHeader>),
}

impl MarkCallbacks {
    /// Callbacks of collector `C`
    pub fn of<C: Collector>() -> Self {
        Self {
            process_object: C::process_object_in_mark,
            process_array: C::process_array_in_mark,
            process_field: C::process_field_in_mark,
        }
    }
}

/// Visit the references of every queued object until none are left
///
/// Depth-first; each reachable object is visited once.
pub fn drain<C: Collector>(state: &mut MarkState) {
    while let Some(obj) = state.pop() {
        match obj.as_array() {
            Some(array) => {
                for index in 0..array.len() {
                    if let Some(slot) = array.element(index) {
                        C::process_field_in_mark(state, slot);
                    }
                }
            },
            None => {
                for slot in obj.reference_fields() {
                    C::process_field_in_mark(state, slot);
                }
            },
        }
    }
}
