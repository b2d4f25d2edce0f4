//! Test Utilities for the gcore Integration Suite
//!
//! Shared fixtures, static type descriptors and assertion helpers. Every
//! test builds its own collector, so tests in one binary never observe
//! each other's epochs, objects or events.

#![allow(dead_code)]

use gcore::object::{ElementKind, TypeInfo};
use gcore::roots::RootHandle;
use gcore::{
    AllocatorFlavor, Collaborators, Collector, Epoch, Gc, GcConfig, GlobalRoots, ManualScheduler,
    MarkAndSweep, NoopCollector, ObjRef, ThreadData,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// ============================================================================
/// TYPE DESCRIPTORS
/// ============================================================================

/// Object with two reference fields
pub static NODE: TypeInfo = TypeInfo::object("Node", 16, &[0, 8]);

/// Object without references
pub static LEAF: TypeInfo = TypeInfo::object("Leaf", 24, &[]);

/// Array of references
pub static REF_ARRAY: TypeInfo = TypeInfo::array("RefArray", ElementKind::Reference);

/// Array of bytes
pub static BYTE_ARRAY: TypeInfo = TypeInfo::array("ByteArray", ElementKind::Primitive(1));

/// Type descriptor of extra data records
pub static EXTRA: TypeInfo = TypeInfo::object("Extra", 0, &[]);

/// ============================================================================
/// GC FIXTURE
/// ============================================================================

/// Test fixture: one collector with registrable roots and a manual scheduler
pub struct GcFixture<C: Collector = MarkAndSweep> {
    pub gc: Gc<C>,
    pub roots: Arc<GlobalRoots>,
    pub scheduler: Arc<ManualScheduler>,
}

impl GcFixture<MarkAndSweep> {
    /// Mark-and-sweep with default configuration
    pub fn mark_sweep() -> Self {
        Self::with_config(quiet_config())
    }

    /// Mark-and-sweep over the given allocator flavor
    pub fn with_flavor(flavor: AllocatorFlavor) -> Self {
        Self::with_config(GcConfig {
            allocator: flavor,
            ..quiet_config()
        })
    }
}

impl GcFixture<NoopCollector> {
    pub fn noop() -> Self {
        Self::with_config(quiet_config())
    }
}

impl<C: Collector> GcFixture<C> {
    /// Build the fixture around `config`
    ///
    /// **Bug this finds:** construction rejecting a valid configuration
    pub fn with_config(config: GcConfig) -> Self {
        let roots = Arc::new(GlobalRoots::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let collaborators = Collaborators::new(roots.clone()).with_scheduler(scheduler.clone());
        let gc = Gc::with_collaborators(config, collaborators)
            .expect("GC initialization should succeed with valid config");
        Self {
            gc,
            roots,
            scheduler,
        }
    }

    /// Collect from `thread`, waiting for finalizers
    pub fn collect(&self, thread: &mut ThreadData<C>) -> Epoch {
        thread.in_native(|| self.gc.collect())
    }

    /// Keep `obj` alive through collections
    pub fn root(&self, obj: ObjRef) -> RootHandle {
        self.roots.register(Some(obj))
    }

    pub fn object_count(&self) -> usize {
        self.gc.allocator().objects().len()
    }

    pub fn extra_count(&self) -> usize {
        self.gc.allocator().extra_objects().len()
    }
}

/// Default configuration without the eager finalizer worker
pub fn quiet_config() -> GcConfig {
    GcConfig {
        start_finalizer_thread: false,
        ..Default::default()
    }
}

/// ============================================================================
/// ASSERTION HELPERS
/// ============================================================================

/// Assert that `obj` survived the last collection
#[track_caller]
pub fn assert_alive<C: Collector>(fixture: &GcFixture<C>, obj: ObjRef, context: &str) {
    assert!(
        fixture.gc.allocator().objects().contains(obj),
        "{}: {:?} should still be allocated",
        context,
        obj
    );
}

/// Assert that `obj` was reclaimed
///
/// Only valid while nothing was allocated since the collection.
#[track_caller]
pub fn assert_reclaimed<C: Collector>(fixture: &GcFixture<C>, addr: usize, context: &str) {
    let reclaimed = fixture
        .gc
        .allocator()
        .objects()
        .objects()
        .iter()
        .all(|obj| obj.address() != addr);
    assert!(reclaimed, "{}: object at {:#x} should be reclaimed", context, addr);
}

/// Assert epochs strictly increase
#[track_caller]
pub fn assert_epochs_increasing(epochs: &[Epoch], context: &str) {
    for pair in epochs.windows(2) {
        assert!(
            pair[1] > pair[0],
            "{}: epoch {} followed by {}",
            context,
            pair[0],
            pair[1]
        );
    }
}

/// Spin until `condition` holds, failing after [`TEST_TIMEOUT`]
#[track_caller]
pub fn wait_until(mut condition: impl FnMut() -> bool, context: &str) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < TEST_TIMEOUT, "{}: timed out", context);
        std::thread::sleep(Duration::from_millis(1));
    }
}
