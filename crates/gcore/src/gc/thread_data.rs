//! ThreadData - per-mutator view of the collector
//!
//! Owns the thread's allocation queues and its registry entry. New objects
//! stay in the queues, invisible to the collector, until the thread
//! publishes them; a thread always publishes before it parks at a
//! safepoint or leaves managed code.

use super::Collector;
use crate::alloc::{ExtraObjectDataThreadQueue, ObjectFactoryThreadQueue};
use crate::object::{ArrayRef, ExtraRef, ObjRef, TypeInfo};
use crate::runtime::{MutatorState, ThreadRegistry};
use std::sync::Arc;

/// ThreadData - one per registered mutator thread
///
/// # Examples
///
/// ```rust
/// use gcore::object::TypeInfo;
/// use gcore::{Collaborators, Gc, GcConfig, NoopCollector};
///
/// static POINT: TypeInfo = TypeInfo::object("Point", 16, &[]);
///
/// let gc = Gc::<NoopCollector>::with_collaborators(GcConfig::default(), Collaborators::default())
///     .unwrap();
/// let mut thread = gc.register_thread();
/// let point = thread.create_object(&POINT);
/// assert!(!gc.allocator().objects().contains(point));
///
/// thread.publish_object_factory();
/// assert!(gc.allocator().objects().contains(point));
/// ```
pub struct ThreadData<C: Collector> {
    collector: Arc<C>,
    registry: Arc<ThreadRegistry>,
    mutator: Arc<MutatorState>,
    objects: ObjectFactoryThreadQueue,
    extra_objects: ExtraObjectDataThreadQueue,
    state: C::ThreadState,
}

impl<C: Collector> ThreadData<C> {
    pub(crate) fn new(collector: Arc<C>) -> Self {
        let registry = collector.registry().clone();
        let mutator = registry.register();
        log::trace!(target: "gc", "mutator {} registered", mutator.id());
        Self {
            collector,
            registry,
            mutator,
            objects: ObjectFactoryThreadQueue::new(),
            extra_objects: ExtraObjectDataThreadQueue::new(),
            state: C::ThreadState::default(),
        }
    }

    pub fn mutator(&self) -> &MutatorState {
        &self.mutator
    }

    /// Strategy-specific thread state
    pub fn collector_state(&self) -> &C::ThreadState {
        &self.state
    }

    /// Allocate an unmarked object of `type_info`
    pub fn create_object(&mut self, type_info: &'static TypeInfo) -> ObjRef {
        let object = self.collector.allocator().allocate_object(type_info);
        self.objects.push(object)
    }

    /// Allocate an unmarked array of `count` elements
    pub fn create_array(&mut self, type_info: &'static TypeInfo, count: usize) -> ArrayRef {
        let object = self.collector.allocator().allocate_array(type_info, count);
        let obj = self.objects.push(object);
        let Some(array) = obj.as_array() else {
            crate::runtime_fail!("{:?} allocated as array without an element kind", obj);
        };
        array
    }

    /// Attach extra data to `obj`
    ///
    /// Aborts if `obj` already has extra data.
    pub fn create_extra_object_data_for_object(
        &mut self,
        obj: ObjRef,
        type_info: &'static TypeInfo,
    ) -> ExtraRef {
        self.extra_objects.create_for_object(obj, type_info)
    }

    /// Tear down extra data attached to a live object
    pub fn destroy_extra_object_data(&mut self, extra: ExtraRef) {
        self.collector
            .allocator()
            .destroy_extra_object_data(&mut self.extra_objects, extra);
    }

    /// Release extra data that never got (or no longer has) an object
    pub fn destroy_unattached_extra_object_data(&mut self, extra: ExtraRef) {
        self.collector
            .allocator()
            .destroy_unattached_extra_object_data(&mut self.extra_objects, extra);
    }

    /// Move this thread's new objects into the global factories
    pub fn publish_object_factory(&mut self) {
        let allocator = self.collector.allocator();
        allocator.objects().publish(&mut self.objects);
        allocator.extra_objects().publish(&mut self.extra_objects);
    }

    /// Objects allocated since the last publish
    pub fn pending_objects(&self) -> usize {
        self.objects.len()
    }

    /// Extra data records created since the last publish
    pub fn pending_extra_objects(&self) -> usize {
        self.extra_objects.len()
    }

    /// Strategy hook run just before this thread parks for a collection
    pub fn on_suspend_for_gc(&mut self) {
        self.collector.on_suspend_for_gc(&mut self.state);
    }

    /// Cooperative suspension point
    #[inline]
    pub fn safe_point(&mut self) {
        if C::SUSPENDS_MUTATORS && self.registry.safepoints().is_requested() {
            self.suspend_slow_path();
        }
    }

    #[cold]
    fn suspend_slow_path(&mut self) {
        self.publish_object_factory();
        self.on_suspend_for_gc();
        self.registry.suspend_current(&self.mutator);
    }

    /// Run `f` outside managed code
    ///
    /// The thread publishes and counts as stopped while `f` runs, so `f`
    /// may block on collections, including ones it schedules itself. `f`
    /// must not touch the heap.
    pub fn in_native<R>(&mut self, f: impl FnOnce() -> R) -> R {
        struct BackToRunnable<'a>(&'a ThreadRegistry, &'a MutatorState);

        impl Drop for BackToRunnable<'_> {
            fn drop(&mut self) {
                self.0.leave_native(self.1);
            }
        }

        self.publish_object_factory();
        self.registry.enter_native(&self.mutator);
        let _guard = BackToRunnable(&self.registry, &self.mutator);
        f()
    }

    /// Drop everything this thread has not published
    ///
    /// Call before `Gc::clear_for_tests`, which frees the objects this
    /// thread's extra data may still point to.
    pub fn clear_for_tests(&mut self) {
        self.extra_objects.clear_for_tests();
        self.objects.clear_for_tests();
    }
}

impl<C: Collector> Drop for ThreadData<C> {
    fn drop(&mut self) {
        self.publish_object_factory();
        self.registry.unregister(&self.mutator);
        log::trace!(target: "gc", "mutator {} unregistered", self.mutator.id());
    }
}
