//! Object Factories - global object lists and per-thread staging queues
//!
//! Mutators never touch the global lists on the allocation path. New
//! objects and extra data records are staged in the owning thread's queue
//! and moved to the global factory in one locked step by `publish()`. The
//! collector only ever sees published entries.
//!
//! ## Publish protocol
//!
//! 1. Thread allocates into its queue (no lock)
//! 2. Thread publishes before it can be considered quiescent
//! 3. Collector enumerates and sweeps the global factory under its lock

use super::HeapObject;
use crate::object::{ExtraObjectData, ExtraRef, ObjRef, TypeInfo};
use indexmap::IndexMap;
use parking_lot::Mutex;

/// ObjectFactory - published heap objects
///
/// Keyed by header address.
pub struct ObjectFactory {
    objects: Mutex<IndexMap<usize, HeapObject>>,
}

impl ObjectFactory {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    pub fn contains(&self, obj: ObjRef) -> bool {
        self.objects.lock().contains_key(&obj.address())
    }

    /// Snapshot of the published objects, in publication order
    pub fn objects(&self) -> Vec<ObjRef> {
        self.objects.lock().values().map(HeapObject::obj_ref).collect()
    }

    /// Bytes held by published objects
    pub fn total_bytes(&self) -> usize {
        self.objects.lock().values().map(HeapObject::size).sum()
    }

    pub(crate) fn publish(&self, queue: &mut ObjectFactoryThreadQueue) {
        if queue.objects.is_empty() {
            return;
        }
        let mut objects = self.objects.lock();
        for object in queue.objects.drain(..) {
            objects.insert(object.obj_ref().address(), object);
        }
    }

    /// Visit every object; `visit` returns the objects to keep
    pub(crate) fn sweep(&self, mut visit: impl FnMut(HeapObject) -> Option<HeapObject>) {
        let mut objects = self.objects.lock();
        let current = std::mem::take(&mut *objects);
        for (address, object) in current {
            if let Some(kept) = visit(object) {
                objects.insert(address, kept);
            }
        }
    }

    pub(crate) fn clear_for_tests(&self) {
        self.objects.lock().clear();
    }
}

impl Default for ObjectFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread staging list for new objects
///
/// Owned by one mutator; not synchronized.
#[derive(Default)]
pub struct ObjectFactoryThreadQueue {
    objects: Vec<HeapObject>,
}

impl ObjectFactoryThreadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, object: HeapObject) -> ObjRef {
        let obj = object.obj_ref();
        self.objects.push(object);
        obj
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn clear_for_tests(&mut self) {
        self.objects.clear();
    }
}

/// ExtraObjectDataFactory - published extra data records
///
/// Keyed by record address, so destruction removes in O(1).
pub struct ExtraObjectDataFactory {
    records: Mutex<IndexMap<usize, Box<ExtraObjectData>>>,
}

impl ExtraObjectDataFactory {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn contains(&self, extra: ExtraRef) -> bool {
        self.records.lock().contains_key(&extra.address())
    }

    pub(crate) fn publish(&self, queue: &mut ExtraObjectDataThreadQueue) {
        if queue.records.is_empty() {
            return;
        }
        let mut records = self.records.lock();
        for (address, record) in queue.records.drain(..) {
            records.insert(address, record);
        }
    }

    pub(crate) fn remove(&self, extra: ExtraRef) -> Option<Box<ExtraObjectData>> {
        self.records.lock().swap_remove(&extra.address())
    }

    /// Visit every record; `visit` returns the records to keep
    pub(crate) fn sweep(
        &self,
        mut visit: impl FnMut(Box<ExtraObjectData>) -> Option<Box<ExtraObjectData>>,
    ) {
        let mut records = self.records.lock();
        let current = std::mem::take(&mut *records);
        for (address, record) in current {
            if let Some(kept) = visit(record) {
                records.insert(address, kept);
            }
        }
    }

    pub(crate) fn clear_for_tests(&self) {
        self.records.lock().clear();
    }
}

impl Default for ExtraObjectDataFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread staging set for new extra data records
#[derive(Default)]
pub struct ExtraObjectDataThreadQueue {
    records: IndexMap<usize, Box<ExtraObjectData>>,
}

impl ExtraObjectDataThreadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and install extra data for `obj`
    ///
    /// Aborts if `obj` already has extra data.
    pub(crate) fn create_for_object(&mut self, obj: ObjRef, type_info: &'static TypeInfo) -> ExtraRef {
        if obj.extra_data().is_some() {
            crate::runtime_fail!("extra object data already exists for {:?}", obj);
        }
        let record = Box::new(ExtraObjectData::new(obj, type_info));
        record.install();
        let extra = ExtraRef::new(&record);
        self.records.insert(extra.address(), record);
        extra
    }

    pub(crate) fn remove(&mut self, extra: ExtraRef) -> Option<Box<ExtraObjectData>> {
        self.records.swap_remove(&extra.address())
    }

    pub fn contains(&self, extra: ExtraRef) -> bool {
        self.records.contains_key(&extra.address())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn clear_for_tests(&mut self) {
        for record in self.records.values() {
            record.uninstall();
        }
        self.records.clear();
    }
}
