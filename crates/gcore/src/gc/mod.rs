//! GC Module - collector strategies behind one facade
//!
//! A strategy implements [`Collector`]; the runtime talks to it through
//! [`Gc`] and one [`ThreadData`] per mutator thread. The strategy is a type
//! parameter, so strategy calls are resolved at compile time and the
//! safepoint poll carries no dispatch.
//!
//! Strategies:
//! - [`NoopCollector`]: never collects, epoch is always 0
//! - [`MarkAndSweep`]: synchronous stop-the-world mark and sweep

pub mod finalizer;
pub mod mark;
pub mod mark_sweep;
pub mod noop;
pub mod state;
pub mod thread_data;

pub use finalizer::{FinalizerProcessor, FinalizerQueue, FinalizerReport};
pub use mark::{MarkCallbacks, MarkState};
pub use mark_sweep::{MarkAndSweep, MarkAndSweepObjectData, MarkAndSweepThread};
pub use noop::{NoopCollector, NoopObjectData};
pub use state::GcStateHolder;
pub use thread_data::ThreadData;

use crate::alloc::Allocator;
use crate::config::GcConfig;
use crate::error::{GcError, Result};
use crate::object::{ArrayRef, ObjHeader, ObjRef, ObjectDataDescriptor, ObjectDataLayout};
use crate::roots::{NoRoots, RootScanner};
use crate::runtime::ThreadRegistry;
use crate::scheduler::{GcScheduler, ManualScheduler};
use crate::stats::GcStatistics;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

/// Collection cycle number; 0 means no collection happened
pub type Epoch = u64;

/// Collector strategy
///
/// Associated functions without `&self` are the mark-phase entry points,
/// called with the world stopped.
pub trait Collector: Send + Sync + Sized + 'static {
    /// Metadata embedded before every object header
    type ObjectData: ObjectDataDescriptor;

    /// Per-mutator strategy state
    type ThreadState: Send + Default;

    const NAME: &'static str;

    /// Whether mutators ever have to park at safepoints
    const SUSPENDS_MUTATORS: bool;

    fn new(config: &GcConfig, allocator: Allocator, collaborators: Collaborators) -> Result<Self>;

    fn allocator(&self) -> &Allocator;

    fn registry(&self) -> &Arc<ThreadRegistry>;

    fn statistics(&self) -> &GcStatistics;

    /// Request a collection, returning its epoch
    fn schedule(&self) -> Epoch;

    fn wait_finished(&self, epoch: Epoch);

    fn wait_finalizers(&self, epoch: Epoch);

    /// Mark `epoch` finalized
    ///
    /// Only the finalizer worker may report an epoch.
    fn on_finalized(&self, epoch: Epoch);

    fn start_finalizer_thread_if_needed(&self) -> Result<()>;

    fn stop_finalizer_thread_if_running(&self);

    fn finalizers_thread_is_running(&self) -> bool;

    fn clear_for_tests(&self);

    /// A mutator is about to park for a collection; must not block
    fn on_suspend_for_gc(&self, thread: &mut Self::ThreadState);

    fn is_marked(obj: ObjRef) -> bool;

    fn try_reset_mark(data: &Self::ObjectData) -> bool;

    fn try_ref(slot: &AtomicPtr<ObjHeader>) -> Option<ObjRef> {
        try_ref(slot)
    }

    fn process_object_in_mark(state: &mut MarkState, obj: ObjRef);

    fn process_array_in_mark(state: &mut MarkState, array: ArrayRef);

    fn process_field_in_mark(state: &mut MarkState, field: &AtomicPtr<ObjHeader>) {
        let Some(obj) = Self::try_ref(field) else {
            return;
        };
        match obj.as_array() {
            Some(array) => Self::process_array_in_mark(state, array),
            None => Self::process_object_in_mark(state, obj),
        }
    }
}

/// Whether `obj` is marked
///
/// Aborts under strategies without a mark phase.
pub fn is_marked<C: Collector>(obj: ObjRef) -> bool {
    C::is_marked(obj)
}

/// Clear the mark bit of `data`, reporting whether it was set
pub fn try_reset_mark<C: Collector>(data: &C::ObjectData) -> bool {
    C::try_reset_mark(data)
}

/// Advisory read of a reference slot
///
/// Relaxed load: the result may be stale with respect to a concurrent
/// store, so callers must re-validate the object before relying on it.
pub fn try_ref(slot: &AtomicPtr<ObjHeader>) -> Option<ObjRef> {
    // SAFETY: heap slots only ever hold null or live object headers
    unsafe { ObjRef::from_raw(slot.load(Ordering::Relaxed)) }
}

/// Components a collector works with but does not own
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<ThreadRegistry>,
    pub scheduler: Arc<dyn GcScheduler>,
    pub roots: Arc<dyn RootScanner>,
}

impl Collaborators {
    /// Fresh registry and a manual scheduler around `roots`
    pub fn new(roots: Arc<dyn RootScanner>) -> Self {
        Self {
            registry: Arc::new(ThreadRegistry::new()),
            scheduler: Arc::new(ManualScheduler::new()),
            roots,
        }
    }

    pub fn with_registry(mut self, registry: Arc<ThreadRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn GcScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new(Arc::new(NoRoots))
    }
}

/// GC facade
///
/// Cheap to clone; clones share the same collector.
///
/// # Examples
///
/// ```rust
/// use gcore::{Collaborators, Gc, GcConfig, NoopCollector};
///
/// let gc = Gc::<NoopCollector>::with_collaborators(GcConfig::default(), Collaborators::default())
///     .expect("valid configuration");
/// assert_eq!(gc.schedule(), 0);
/// gc.wait_finalizers(0);
/// ```
pub struct Gc<C: Collector> {
    collector: Arc<C>,
}

impl<C: Collector> Clone for Gc<C> {
    fn clone(&self) -> Self {
        Self {
            collector: self.collector.clone(),
        }
    }
}

impl<C: Collector> Gc<C> {
    /// Build the strategy around `allocator`
    ///
    /// The allocator must reserve `C::ObjectData` in every object.
    pub fn new(config: GcConfig, allocator: Allocator, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let expected = ObjectDataLayout::of::<C::ObjectData>();
        if *allocator.object_data_layout() != expected {
            return Err(GcError::InvalidArgument(format!(
                "allocator reserves {:?}, {} needs {:?}",
                allocator.object_data_layout(),
                C::NAME,
                expected
            )));
        }

        let collector = C::new(&config, allocator, collaborators)?;
        Ok(Self {
            collector: Arc::new(collector),
        })
    }

    /// Build the strategy with an allocator of the configured flavor
    pub fn with_collaborators(config: GcConfig, collaborators: Collaborators) -> Result<Self> {
        let allocator = Allocator::for_collector::<C>(config.allocator);
        Self::new(config, allocator, collaborators)
    }

    /// Register the calling thread as a mutator
    pub fn register_thread(&self) -> ThreadData<C> {
        ThreadData::new(self.collector.clone())
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }

    pub fn allocator(&self) -> &Allocator {
        self.collector.allocator()
    }

    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        self.collector.registry()
    }

    pub fn statistics(&self) -> &GcStatistics {
        self.collector.statistics()
    }

    /// Request a collection
    ///
    /// Registered mutators must call this inside [`ThreadData::in_native`].
    pub fn schedule(&self) -> Epoch {
        self.collector.schedule()
    }

    /// Block until `epoch` finished
    ///
    /// Like [`Self::schedule`], registered mutators must wait inside
    /// [`ThreadData::in_native`].
    pub fn wait_finished(&self, epoch: Epoch) {
        self.collector.wait_finished(epoch)
    }

    pub fn wait_finalizers(&self, epoch: Epoch) {
        self.collector.wait_finalizers(epoch)
    }

    /// Report `epoch` finalized; callable only from the finalizer worker
    pub fn on_finalized(&self, epoch: Epoch) {
        self.collector.on_finalized(epoch)
    }

    /// Collect and wait until the epoch's finalizers ran
    pub fn collect(&self) -> Epoch {
        let epoch = self.schedule();
        self.wait_finalizers(epoch);
        epoch
    }

    pub fn start_finalizer_thread_if_needed(&self) -> Result<()> {
        self.collector.start_finalizer_thread_if_needed()
    }

    pub fn stop_finalizer_thread_if_running(&self) {
        self.collector.stop_finalizer_thread_if_running()
    }

    pub fn finalizers_thread_is_running(&self) -> bool {
        self.collector.finalizers_thread_is_running()
    }

    /// Stop the finalizer worker, free every published object and reset
    /// statistics; epoch numbering continues
    pub fn clear_for_tests(&self) {
        self.collector.clear_for_tests()
    }
}
