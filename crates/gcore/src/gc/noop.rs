//! No-op Collector - allocation without reclamation
//!
//! Objects are allocated and published like under any other strategy but
//! never freed until `clear_for_tests` or teardown. There is no mark phase,
//! so the mark-state queries are contract violations here.

use super::mark::MarkState;
use super::{Collaborators, Collector, Epoch};
use crate::alloc::Allocator;
use crate::config::GcConfig;
use crate::error::Result;
use crate::logging::{GcEvent, GcLogger};
use crate::object::{ArrayRef, ObjHeader, ObjRef, ObjectDataDescriptor};
use crate::runtime::ThreadRegistry;
use crate::stats::GcStatistics;
use std::sync::atomic::AtomicPtr;
use std::sync::Arc;

/// Collector metadata of the no-op strategy: nothing
pub struct NoopObjectData;

impl ObjectDataDescriptor for NoopObjectData {
    unsafe fn construct(ptr: *mut u8) -> *mut Self {
        ptr.cast()
    }
}

/// NoopCollector - never collects
pub struct NoopCollector {
    allocator: Allocator,
    registry: Arc<ThreadRegistry>,
    stats: GcStatistics,
}

impl Collector for NoopCollector {
    type ObjectData = NoopObjectData;
    type ThreadState = ();

    const NAME: &'static str = "No-op";
    const SUSPENDS_MUTATORS: bool = false;

    fn new(config: &GcConfig, allocator: Allocator, collaborators: Collaborators) -> Result<Self> {
        let stats = GcStatistics::new(
            config.stats_history,
            GcLogger::new(config.cycle_log_level()),
        );
        stats.logger().log(GcEvent::CollectorInitialized {
            collector: Self::NAME,
        });
        Ok(Self {
            allocator,
            registry: collaborators.registry,
            stats,
        })
    }

    fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    fn statistics(&self) -> &GcStatistics {
        &self.stats
    }

    fn schedule(&self) -> Epoch {
        0
    }

    fn wait_finished(&self, _epoch: Epoch) {}

    fn wait_finalizers(&self, _epoch: Epoch) {}

    fn on_finalized(&self, _epoch: Epoch) {}

    fn start_finalizer_thread_if_needed(&self) -> Result<()> {
        Ok(())
    }

    fn stop_finalizer_thread_if_running(&self) {}

    fn finalizers_thread_is_running(&self) -> bool {
        false
    }

    fn clear_for_tests(&self) {
        self.allocator.clear_for_tests();
        self.stats.clear();
    }

    fn on_suspend_for_gc(&self, _thread: &mut ()) {}

    fn is_marked(obj: ObjRef) -> bool {
        crate::runtime_fail!("is_marked({:?}) called without a mark phase", obj);
    }

    fn try_reset_mark(_data: &NoopObjectData) -> bool {
        crate::runtime_fail!("try_reset_mark called without a mark phase");
    }

    fn process_object_in_mark(_state: &mut MarkState, _obj: ObjRef) {}

    fn process_array_in_mark(_state: &mut MarkState, _array: ArrayRef) {}

    fn process_field_in_mark(_state: &mut MarkState, _field: &AtomicPtr<ObjHeader>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectDataLayout;

    #[test]
    fn test_object_data_is_empty() {
        let layout = ObjectDataLayout::of::<NoopObjectData>();
        assert_eq!(layout.size(), 0);
        assert_eq!(layout.alignment(), 1);
        assert_eq!(layout.header_offset(), 0);
    }

    #[test]
    #[should_panic(expected = "without a mark phase")]
    fn test_try_reset_mark_is_fatal() {
        NoopCollector::try_reset_mark(&NoopObjectData);
    }
}
