//! Mark-and-Sweep Collector - stop-the-world tracing
//!
//! Collection Cycle:
//! ```text
//! schedule ─> start ─> suspend threads ─> mark roots + drain
//!    ─> sweep extra data ─> sweep objects ─> resume threads
//!    ─> finish ─> finalizer batch ─> finalized
//! ```
//!
//! The cycle runs on the thread that called `schedule()`. Concurrent
//! callers are serialized; a caller whose epoch was already collected by
//! someone else returns without running another cycle. Finalizers run
//! afterwards on the finalizer worker.

use super::finalizer::{FinalizerListener, FinalizerProcessor, FinalizerQueue, FinalizerReport};
use super::mark::{self, MarkCallbacks, MarkState};
use super::state::GcStateHolder;
use super::{Collaborators, Collector, Epoch};
use crate::alloc::Allocator;
use crate::config::GcConfig;
use crate::error::Result;
use crate::logging::{GcEvent, GcLogger};
use crate::object::{
    object_data_for_object, ArrayRef, ElementKind, ExtraRef, ObjRef, ObjectDataDescriptor,
};
use crate::roots::RootScanner;
use crate::runtime::ThreadRegistry;
use crate::scheduler::GcScheduler;
use crate::stats::{GcStatistics, GcTimer, SweepCounts};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const MARKED: usize = 1;

/// Collector metadata of the mark-and-sweep strategy
///
/// Bit 0 is the mark bit; the rest of the word is reserved.
#[repr(C)]
pub struct MarkAndSweepObjectData {
    flags: AtomicUsize,
}

impl MarkAndSweepObjectData {
    pub fn is_marked(&self) -> bool {
        self.flags.load(Ordering::Acquire) & MARKED != 0
    }

    /// Set the mark bit, returning true if it was clear
    pub fn try_mark(&self) -> bool {
        self.flags.fetch_or(MARKED, Ordering::AcqRel) & MARKED == 0
    }

    /// Clear the mark bit, returning true if it was set
    pub fn try_reset_mark(&self) -> bool {
        self.flags.fetch_and(!MARKED, Ordering::AcqRel) & MARKED != 0
    }
}

impl ObjectDataDescriptor for MarkAndSweepObjectData {
    unsafe fn construct(ptr: *mut u8) -> *mut Self {
        let data = ptr.cast::<Self>();
        data.write(Self {
            flags: AtomicUsize::new(0),
        });
        data
    }
}

/// Per-thread state of the mark-and-sweep strategy
#[derive(Debug, Default)]
pub struct MarkAndSweepThread {
    suspensions: u64,
}

impl MarkAndSweepThread {
    /// Times this thread was stopped for a collection
    pub fn suspensions(&self) -> u64 {
        self.suspensions
    }
}

/// Epoch bookkeeping shared with the finalizer worker
struct Epochs {
    state: GcStateHolder,
    stats: GcStatistics,
}

impl FinalizerListener for Epochs {
    fn on_finalizer_failed(&self, epoch: Epoch, type_name: &'static str) {
        self.stats.handle(epoch).finalizer_failed(type_name);
    }

    fn on_batch_finished(&self, epoch: Epoch, report: FinalizerReport) {
        self.stats
            .handle(epoch)
            .finalizers_done(report.finalized, report.failed);
        self.state.finalized(epoch);
    }
}

/// Resumes mutators when dropped, also on unwind
struct WorldStopped<'a>(&'a ThreadRegistry);

impl Drop for WorldStopped<'_> {
    fn drop(&mut self) {
        self.0.resume_threads();
    }
}

/// MarkAndSweep - synchronous stop-the-world collector
pub struct MarkAndSweep {
    mark_stack_capacity: usize,
    allocator: Allocator,
    registry: Arc<ThreadRegistry>,
    scheduler: Arc<dyn GcScheduler>,
    roots: Arc<dyn RootScanner>,
    epochs: Arc<Epochs>,
    finalizer: FinalizerProcessor,
    collection: Mutex<()>,
}

impl MarkAndSweep {
    /// Epoch scheduler
    pub fn state(&self) -> &GcStateHolder {
        &self.epochs.state
    }

    /// Finalization batches waiting for the worker
    pub fn pending_finalizer_batches(&self) -> usize {
        self.finalizer.pending_batches()
    }

    fn object_data(obj: &ObjRef) -> &MarkAndSweepObjectData {
        object_data_for_object::<MarkAndSweepObjectData>(obj)
    }

    /// A runnable mutator blocking here would never reach a safepoint
    fn assert_not_runnable_mutator(&self, operation: &str) {
        crate::runtime_assert!(
            !self.registry.is_runnable_mutator(thread::current().id()),
            "{} from a runnable mutator; wrap the call in ThreadData::in_native",
            operation
        );
    }

    fn collect_epoch(&self, epoch: Epoch) {
        let timer = GcTimer::new();
        let handle = self.epochs.stats.handle(epoch);

        self.epochs.state.start(epoch);
        handle.started();
        self.scheduler.on_gc_start(epoch);

        let threads = self.registry.suspend_threads();
        let world = WorldStopped(&self.registry);
        handle.threads_suspended(threads);

        let mut state = MarkState::new(epoch, self.mark_stack_capacity);
        self.roots.scan_roots(&mut state, &MarkCallbacks::of::<Self>());
        mark::drain::<Self>(&mut state);
        handle.marked(state.marked());

        let mut counts = SweepCounts {
            extra_swept: self.sweep_extra_objects(),
            ..Default::default()
        };
        let batch = self.sweep_objects(&mut counts);
        handle.swept(counts);

        drop(world);
        self.epochs.state.finish(epoch);
        handle.finished(&timer);
        self.scheduler
            .on_gc_finish(epoch, self.allocator.allocated_bytes());

        self.finalizer.schedule_tasks(epoch, batch);
    }

    /// Free reclaimable records; clear weak referents of dead objects
    ///
    /// Runs before the object sweep, while mark bits are still set.
    fn sweep_extra_objects(&self) -> usize {
        let mut swept = 0;
        self.allocator.extra_objects().sweep(|extra| {
            if extra.is_reclaimable() {
                swept += 1;
                return None;
            }
            if let Some(base) = extra.base_object() {
                if !Self::object_data(&base).is_marked() {
                    extra.clear_weak_referent();
                }
            }
            Some(extra)
        });
        swept
    }

    /// Reset marks of survivors, free or queue the rest
    fn sweep_objects(&self, counts: &mut SweepCounts) -> FinalizerQueue {
        let mut batch = FinalizerQueue::new();
        let extra_objects = self.allocator.extra_objects();

        self.allocator.objects().sweep(|object| {
            let obj = object.obj_ref();
            if Self::try_reset_mark(Self::object_data(&obj)) {
                counts.kept += 1;
                return Some(object);
            }

            let extra = obj.extra_data().map(ExtraRef::new);
            let needs_finalizer = obj.type_info().finalizer().is_some()
                || extra.map_or(false, |extra| extra.has_associated_object());
            let record = extra.and_then(|extra| extra_objects.remove(extra));

            if needs_finalizer {
                counts.finalizable += 1;
                batch.push(object, record);
                return None;
            }

            match (record, extra) {
                (Some(record), _) => {
                    record.uninstall();
                    counts.extra_swept += 1;
                },
                (None, Some(extra)) => extra.uninstall(),
                (None, None) => {},
            }
            counts.swept += 1;
            None
        });
        batch
    }
}

impl Collector for MarkAndSweep {
    type ObjectData = MarkAndSweepObjectData;
    type ThreadState = MarkAndSweepThread;

    const NAME: &'static str = "Same thread Mark & Sweep";
    const SUSPENDS_MUTATORS: bool = true;

    fn new(config: &GcConfig, allocator: Allocator, collaborators: Collaborators) -> Result<Self> {
        let epochs = Arc::new(Epochs {
            state: GcStateHolder::new(),
            stats: GcStatistics::new(
                config.stats_history,
                GcLogger::new(config.cycle_log_level()),
            ),
        });
        let finalizer =
            FinalizerProcessor::new(config.finalizer_thread_name.clone(), epochs.clone());
        if config.start_finalizer_thread {
            finalizer.start_if_needed()?;
        }

        epochs.stats.logger().log(GcEvent::CollectorInitialized {
            collector: Self::NAME,
        });

        Ok(Self {
            mark_stack_capacity: config.mark_stack_capacity,
            allocator,
            registry: collaborators.registry,
            scheduler: collaborators.scheduler,
            roots: collaborators.roots,
            epochs,
            finalizer,
            collection: Mutex::new(()),
        })
    }

    fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    fn statistics(&self) -> &GcStatistics {
        &self.epochs.stats
    }

    fn schedule(&self) -> Epoch {
        self.assert_not_runnable_mutator("collection requested");

        let (epoch, fresh) = self.epochs.state.schedule_tracked();
        if fresh {
            self.epochs.stats.handle(epoch).scheduled();
        }

        let _collection = self.collection.lock();
        if self.epochs.state.finished_epoch() < epoch {
            self.collect_epoch(epoch);
        }
        epoch
    }

    fn wait_finished(&self, epoch: Epoch) {
        self.assert_not_runnable_mutator("epoch wait");
        self.epochs.state.wait_epoch_finished(epoch);
    }

    fn wait_finalizers(&self, epoch: Epoch) {
        self.assert_not_runnable_mutator("epoch wait");
        self.epochs.state.wait_epoch_finalized(epoch);
    }

    fn on_finalized(&self, epoch: Epoch) {
        let caller = thread::current().id();
        crate::runtime_assert!(
            self.finalizer.worker_thread() == Some(caller),
            "finalized notification for epoch {} outside the finalizer worker",
            epoch
        );
        self.epochs.state.finalized(epoch);
    }

    fn start_finalizer_thread_if_needed(&self) -> Result<()> {
        self.finalizer.start_if_needed()
    }

    fn stop_finalizer_thread_if_running(&self) {
        self.finalizer.stop_if_running();
    }

    fn finalizers_thread_is_running(&self) -> bool {
        self.finalizer.is_running()
    }

    fn clear_for_tests(&self) {
        self.finalizer.stop_if_running();
        self.allocator.clear_for_tests();
        self.epochs.stats.clear();
    }

    fn on_suspend_for_gc(&self, thread: &mut MarkAndSweepThread) {
        thread.suspensions += 1;
    }

    fn is_marked(obj: ObjRef) -> bool {
        Self::object_data(&obj).is_marked()
    }

    fn try_reset_mark(data: &MarkAndSweepObjectData) -> bool {
        data.try_reset_mark()
    }

    fn process_object_in_mark(state: &mut MarkState, obj: ObjRef) {
        if let Some(array) = obj.as_array() {
            return Self::process_array_in_mark(state, array);
        }
        if Self::object_data(&obj).try_mark() {
            if obj.type_info().has_references() {
                state.enqueue(obj);
            } else {
                state.record_leaf();
            }
        }
    }

    fn process_array_in_mark(state: &mut MarkState, array: ArrayRef) {
        let obj = array.as_obj();
        if Self::object_data(&obj).try_mark() {
            if array.element_kind() == ElementKind::Reference && !array.is_empty() {
                state.enqueue(obj);
            } else {
                state.record_leaf();
            }
        }
    }
}

impl Drop for MarkAndSweep {
    fn drop(&mut self) {
        self.finalizer.stop_if_running();
        self.epochs.state.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectDataLayout;

    #[test]
    fn test_object_data_layout() {
        let layout = ObjectDataLayout::of::<MarkAndSweepObjectData>();
        assert_eq!(layout.size(), std::mem::size_of::<usize>());
        assert_eq!(layout.alignment(), std::mem::align_of::<usize>());
    }

    #[test]
    fn test_mark_bit_round_trip() {
        let data = MarkAndSweepObjectData {
            flags: AtomicUsize::new(0),
        };
        assert!(!data.is_marked());
        assert!(data.try_mark());
        assert!(!data.try_mark());
        assert!(data.is_marked());
        assert!(data.try_reset_mark());
        assert!(!data.try_reset_mark());
    }
}
