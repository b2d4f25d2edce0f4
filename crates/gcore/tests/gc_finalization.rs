//! GC Finalization Tests - finalizers, extra object data and weak referents
//!
//! These tests verify that:
//! - Every garbage object with a finalizer is finalized exactly once
//! - A panicking finalizer does not stop the rest of its batch
//! - Extra data is exclusive per object and reclaimed per allocator flavor
//! - Weak referents of dead objects are cleared before finalizers run
//!
//! ============================================================================
//! EACH TEST TARGETS ONE FINALIZATION PROPERTY - DO NOT WEAKEN ASSERTIONS
//! ============================================================================

mod common;

use common::{GcFixture, EXTRA, LEAF};
use gcore::logging::GcEvent;
use gcore::object::TypeInfo;
use gcore::{AllocatorFlavor, ObjRef};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// ============================================================================
/// FINALIZER TESTS
/// ============================================================================

static CLOSED: AtomicUsize = AtomicUsize::new(0);

fn close(_: ObjRef) {
    CLOSED.fetch_add(1, Ordering::SeqCst);
}

static HANDLE: TypeInfo = TypeInfo::object("Handle", 8, &[]).with_finalizer(close);

/// Test that only garbage objects are finalized, each once
///
/// **Bug this finds:** finalizers run for live objects or run twice
/// **Invariant verified:** finalized count equals garbage count
#[test]
fn test_finalizers_run_once_for_garbage() {
    // Arrange
    let fixture = GcFixture::mark_sweep();
    let mut thread = fixture.gc.register_thread();
    let live = thread.create_object(&HANDLE);
    for _ in 0..3 {
        thread.create_object(&HANDLE);
    }
    fixture.root(live);
    let before = CLOSED.load(Ordering::SeqCst);

    // Act
    let first = fixture.collect(&mut thread);
    let second = fixture.collect(&mut thread);

    // Assert
    assert_eq!(CLOSED.load(Ordering::SeqCst) - before, 3);
    assert_eq!(fixture.object_count(), 1);
    let stats = fixture.gc.statistics();
    assert_eq!(stats.epoch(first).map(|e| e.finalizable), Some(3));
    assert_eq!(stats.epoch(first).map(|e| e.finalized), Some(3));
    assert_eq!(stats.epoch(second).map(|e| e.finalized), Some(0));
}

static SURVIVED: AtomicUsize = AtomicUsize::new(0);

fn count_survivor(_: ObjRef) {
    SURVIVED.fetch_add(1, Ordering::SeqCst);
}

fn explode(obj: ObjRef) {
    panic!("finalizer of {:?} exploded", obj);
}

static COUNTED: TypeInfo = TypeInfo::object("Counted", 8, &[]).with_finalizer(count_survivor);
static EXPLODING: TypeInfo = TypeInfo::object("Exploding", 8, &[]).with_finalizer(explode);

/// Test that one failing finalizer does not stop the batch
///
/// **Bug this finds:** worker thread dying, epoch never reported finalized
/// **Invariant verified:** wait_finalizers returns and the rest still ran
#[test]
fn test_failing_finalizer_isolated() {
    let fixture = GcFixture::mark_sweep();
    let mut thread = fixture.gc.register_thread();
    thread.create_object(&COUNTED);
    thread.create_object(&EXPLODING);
    thread.create_object(&COUNTED);
    let before = SURVIVED.load(Ordering::SeqCst);

    let epoch = fixture.collect(&mut thread);

    assert_eq!(SURVIVED.load(Ordering::SeqCst) - before, 2);
    assert_eq!(fixture.object_count(), 0);

    let stats = fixture.gc.statistics();
    let record = stats.epoch(epoch).expect("epoch recorded");
    assert_eq!((record.finalized, record.finalizer_failures), (2, 1));
    assert_eq!(stats.summary().finalizer_failures, 1);
    assert!(stats.logger().events_for(epoch).contains(&GcEvent::FinalizerFailed {
        epoch,
        type_name: "Exploding",
    }));

    // The worker survives and serves the next epoch
    thread.create_object(&COUNTED);
    fixture.collect(&mut thread);
    assert_eq!(SURVIVED.load(Ordering::SeqCst) - before, 3);
    assert!(fixture.gc.finalizers_thread_is_running());
}

/// ============================================================================
/// EXTRA OBJECT DATA TESTS
/// ============================================================================

/// Test that an object holds at most one extra data record
///
/// **Bug this finds:** second record silently replacing the first
#[test]
#[should_panic(expected = "extra object data already exists")]
fn test_extra_data_exclusive() {
    let fixture = GcFixture::mark_sweep();
    let mut thread = fixture.gc.register_thread();
    let obj = thread.create_object(&LEAF);

    thread.create_extra_object_data_for_object(obj, &EXTRA);
    thread.create_extra_object_data_for_object(obj, &EXTRA);
}

/// Test eager reclamation under thread queues
///
/// **Invariant verified:** the record is gone as soon as it is destroyed
#[test]
fn test_extra_data_destroyed_eagerly() {
    let fixture = GcFixture::with_flavor(AllocatorFlavor::ThreadQueues);
    let mut thread = fixture.gc.register_thread();
    let obj = thread.create_object(&LEAF);
    fixture.root(obj);

    let extra = thread.create_extra_object_data_for_object(obj, &EXTRA);
    assert_eq!(thread.pending_extra_objects(), 1);
    thread.publish_object_factory();
    assert_eq!(fixture.extra_count(), 1);
    assert_eq!(extra.base_object(), Some(obj));

    thread.destroy_extra_object_data(extra);

    assert_eq!(fixture.extra_count(), 0);
    assert!(obj.extra_data().is_none());

    // The object can take a fresh record afterwards
    thread.create_extra_object_data_for_object(obj, &EXTRA);
    assert!(obj.extra_data().is_some());
}

/// Test lazy reclamation under the custom allocator
///
/// **Invariant verified:** the record is flagged at once and freed by the
/// next sweep
#[test]
fn test_extra_data_destroyed_lazily() {
    let fixture = GcFixture::with_flavor(AllocatorFlavor::Custom);
    let mut thread = fixture.gc.register_thread();
    let obj = thread.create_object(&LEAF);
    fixture.root(obj);
    let extra = thread.create_extra_object_data_for_object(obj, &EXTRA);
    thread.publish_object_factory();

    thread.destroy_extra_object_data(extra);

    assert_eq!(fixture.extra_count(), 1);
    assert!(extra.is_finalized());
    assert!(!extra.is_installed());
    assert!(obj.extra_data().is_none());

    let epoch = fixture.collect(&mut thread);

    assert_eq!(fixture.extra_count(), 0);
    assert_eq!(fixture.object_count(), 1);
    let record = fixture.gc.statistics().epoch(epoch).expect("epoch recorded");
    assert_eq!(record.extra_swept, 1);
}

/// Test that unattached records are swept lazily under the custom allocator
#[test]
fn test_unattached_extra_data_swept() {
    let fixture = GcFixture::with_flavor(AllocatorFlavor::Custom);
    let mut thread = fixture.gc.register_thread();
    let obj = thread.create_object(&LEAF);
    fixture.root(obj);
    let extra = thread.create_extra_object_data_for_object(obj, &EXTRA);

    thread.destroy_unattached_extra_object_data(extra);
    assert!(extra.is_sweepable());
    assert!(obj.extra_data().is_none());

    fixture.collect(&mut thread);
    assert_eq!(fixture.extra_count(), 0);
}

/// Test that a dead object's record dies with it
///
/// **Bug this finds:** records leaked after their base object is swept
#[test]
fn test_extra_data_reclaimed_with_object() {
    let fixture = GcFixture::mark_sweep();
    let mut thread = fixture.gc.register_thread();
    let obj = thread.create_object(&LEAF);
    thread.create_extra_object_data_for_object(obj, &EXTRA);

    let epoch = fixture.collect(&mut thread);

    assert_eq!(fixture.object_count(), 0);
    assert_eq!(fixture.extra_count(), 0);
    let record = fixture.gc.statistics().epoch(epoch).expect("epoch recorded");
    assert_eq!((record.swept, record.extra_swept), (1, 1));
}

/// ============================================================================
/// ASSOCIATED OBJECT TESTS
/// ============================================================================

struct NativeResource(Arc<AtomicUsize>);

impl Drop for NativeResource {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test that an associated native object is released with its base
///
/// **Invariant verified:** the resource is dropped once, by the finalizer worker
#[test]
fn test_associated_object_released() {
    let fixture = GcFixture::mark_sweep();
    let mut thread = fixture.gc.register_thread();
    let released = Arc::new(AtomicUsize::new(0));
    let live = thread.create_object(&LEAF);
    let dead = thread.create_object(&LEAF);
    fixture.root(live);

    for obj in [live, dead] {
        let extra = thread.create_extra_object_data_for_object(obj, &EXTRA);
        let previous = extra.set_associated_object(Box::new(NativeResource(released.clone())));
        assert!(previous.is_none());
    }

    let epoch = fixture.collect(&mut thread);

    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.object_count(), 1);
    assert_eq!(fixture.extra_count(), 1);
    let record = fixture.gc.statistics().epoch(epoch).expect("epoch recorded");
    assert_eq!((record.finalizable, record.finalized), (1, 1));
    assert!(live.extra_data().map_or(false, |extra| extra.has_associated_object()));
}

/// ============================================================================
/// WEAK REFERENCE TESTS
/// ============================================================================

static CLEARED: AtomicUsize = AtomicUsize::new(0);
static UNCLEARED: AtomicUsize = AtomicUsize::new(0);

fn check_weak(obj: ObjRef) {
    let cleared = obj
        .extra_data()
        .map_or(false, |extra| extra.weak_referent().is_none());
    if cleared {
        CLEARED.fetch_add(1, Ordering::SeqCst);
    } else {
        UNCLEARED.fetch_add(1, Ordering::SeqCst);
    }
}

static WEAKLY_HELD: TypeInfo = TypeInfo::object("WeaklyHeld", 8, &[]).with_finalizer(check_weak);

/// Test that weak referents survive with their object and clear on death
///
/// **Bug this finds:** weak reference resurrecting a swept object
/// **Invariant verified:** a finalizer never sees a weak referent to itself
#[test]
fn test_weak_referent_cleared() {
    let fixture = GcFixture::mark_sweep();
    let mut thread = fixture.gc.register_thread();
    let obj = thread.create_object(&WEAKLY_HELD);
    let extra = thread.create_extra_object_data_for_object(obj, &EXTRA);
    extra.enable_weak_reference();
    assert_eq!(extra.weak_referent(), Some(obj));
    let root = fixture.root(obj);

    fixture.collect(&mut thread);
    assert_eq!(extra.weak_referent(), Some(obj));

    let cleared_before = CLEARED.load(Ordering::SeqCst);
    let uncleared_before = UNCLEARED.load(Ordering::SeqCst);
    fixture.roots.unregister(root);
    fixture.collect(&mut thread);

    assert_eq!(CLEARED.load(Ordering::SeqCst) - cleared_before, 1);
    assert_eq!(UNCLEARED.load(Ordering::SeqCst) - uncleared_before, 0);
    assert_eq!(fixture.object_count(), 0);
    assert_eq!(fixture.extra_count(), 0);
}
