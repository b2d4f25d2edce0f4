//! Allocator Module - object construction and factories
//!
//! The allocator reserves `[ObjectData][header][payload]` for every object,
//! constructs the collector metadata through the captured
//! [`ObjectDataLayout`], and owns the global factories that published
//! objects and extra data live in.
//!
//! Extra object data destruction depends on the allocator flavor:
//! - `ThreadQueues`: eager, the record leaves its queue or factory at once
//! - `Custom`: lazy, the record is flagged and the next sweep frees it

pub mod factory;

pub use factory::{
    ExtraObjectDataFactory, ExtraObjectDataThreadQueue, ObjectFactory, ObjectFactoryThreadQueue,
};

use crate::config::AllocatorFlavor;
use crate::gc::Collector;
use crate::object::extra::{FLAG_FINALIZED, FLAG_SWEEPABLE};
use crate::object::{ArrayHeader, ExtraRef, ObjHeader, ObjRef, ObjectDataLayout, TypeInfo};
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

/// HeapObject - one allocation owned by a queue, factory or finalizer batch
///
/// Dropping it frees the memory.
pub struct HeapObject {
    base: NonNull<u8>,
    layout: Layout,
    header: ObjRef,
}

// SAFETY: the allocation is uniquely owned by this value
unsafe impl Send for HeapObject {}

impl HeapObject {
    pub fn obj_ref(&self) -> ObjRef {
        self.header
    }

    /// Allocation size in bytes, metadata included
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for HeapObject {
    fn drop(&mut self) {
        // SAFETY: allocated in `Allocator::allocate_with` with this layout
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

/// Allocator - object construction plus the global factories
pub struct Allocator {
    layout: ObjectDataLayout,
    flavor: AllocatorFlavor,
    objects: ObjectFactory,
    extra_objects: ExtraObjectDataFactory,
}

impl Allocator {
    pub fn new(layout: ObjectDataLayout, flavor: AllocatorFlavor) -> Self {
        Self {
            layout,
            flavor,
            objects: ObjectFactory::new(),
            extra_objects: ExtraObjectDataFactory::new(),
        }
    }

    /// Allocator reserving metadata for collector `C`
    pub fn for_collector<C: Collector>(flavor: AllocatorFlavor) -> Self {
        Self::new(ObjectDataLayout::of::<C::ObjectData>(), flavor)
    }

    pub fn object_data_layout(&self) -> &ObjectDataLayout {
        &self.layout
    }

    pub fn flavor(&self) -> AllocatorFlavor {
        self.flavor
    }

    pub fn objects(&self) -> &ObjectFactory {
        &self.objects
    }

    pub fn extra_objects(&self) -> &ExtraObjectDataFactory {
        &self.extra_objects
    }

    /// Bytes held by published objects
    pub fn allocated_bytes(&self) -> usize {
        self.objects.total_bytes()
    }

    pub(crate) fn allocate_object(&self, type_info: &'static TypeInfo) -> HeapObject {
        crate::runtime_assert!(
            !type_info.is_array(),
            "{} is an array type",
            type_info.name()
        );
        crate::runtime_assert!(
            type_info.validate_layout(),
            "reference offsets of {} do not fit its instance size",
            type_info.name()
        );
        self.allocate_with(type_info.instance_size(), |header: *mut ObjHeader| {
            // SAFETY: `header` is aligned and within the fresh allocation
            unsafe { header.write(ObjHeader::new(type_info)) }
        })
    }

    pub(crate) fn allocate_array(&self, type_info: &'static TypeInfo, count: usize) -> HeapObject {
        crate::runtime_assert!(
            type_info.is_array(),
            "{} is not an array type",
            type_info.name()
        );
        let Ok(length) = u32::try_from(count) else {
            crate::runtime_fail!("array length {} exceeds the header range", count);
        };
        let Some(payload_size) = type_info.payload_size(count) else {
            crate::runtime_fail!("array of {} x {} overflows", count, type_info.name());
        };
        self.allocate_with(payload_size, |header: *mut ArrayHeader| {
            // SAFETY: `header` is aligned and within the fresh allocation
            unsafe { header.write(ArrayHeader::new(type_info, length)) }
        })
    }

    fn allocate_with<H>(&self, payload_size: usize, init: impl FnOnce(*mut H)) -> HeapObject {
        let Some(layout) = self.layout.object_layout::<H>(payload_size) else {
            crate::runtime_fail!("object of {} payload bytes overflows", payload_size);
        };
        // SAFETY: the layout always covers at least the header
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };
        // SAFETY: metadata is constructed exactly once, before the header is
        // written; the header lies inside the allocation
        unsafe {
            self.layout.construct(base.as_ptr());
            let header = base.as_ptr().add(self.layout.header_offset()).cast::<H>();
            init(header);
            HeapObject {
                base,
                layout,
                header: ObjRef::from_non_null(NonNull::new_unchecked(header.cast())),
            }
        }
    }

    /// Tear down extra data that is attached to an object
    ///
    /// The record leaves no index behind in `queue` or the global factory:
    /// eager flavors remove it at once, lazy ones flag it for the next
    /// sweep. The handle must not be used afterwards.
    pub(crate) fn destroy_extra_object_data(
        &self,
        queue: &mut ExtraObjectDataThreadQueue,
        extra: ExtraRef,
    ) {
        match self.flavor {
            AllocatorFlavor::ThreadQueues => {
                let Some(record) = queue
                    .remove(extra)
                    .or_else(|| self.extra_objects.remove(extra))
                else {
                    crate::runtime_fail!("{:?} destroyed twice or never created", extra);
                };
                record.uninstall();
            },
            AllocatorFlavor::Custom => {
                crate::runtime_assert!(
                    !extra.is_reclaimable(),
                    "{:?} destroyed twice",
                    extra
                );
                drop(extra.release_associated_object());
                extra.uninstall();
                extra.set_flag(FLAG_FINALIZED);
            },
        }
    }

    /// Release extra data whose object was never attached or already gone
    pub(crate) fn destroy_unattached_extra_object_data(
        &self,
        queue: &mut ExtraObjectDataThreadQueue,
        extra: ExtraRef,
    ) {
        match self.flavor {
            AllocatorFlavor::ThreadQueues => {
                let Some(record) = queue
                    .remove(extra)
                    .or_else(|| self.extra_objects.remove(extra))
                else {
                    crate::runtime_fail!("{:?} destroyed twice or never created", extra);
                };
                record.uninstall();
            },
            AllocatorFlavor::Custom => {
                extra.uninstall();
                if extra.set_flag(FLAG_SWEEPABLE) {
                    crate::runtime_fail!("{:?} destroyed twice", extra);
                }
            },
        }
    }

    /// Free every published object and extra data record
    pub fn clear_for_tests(&self) {
        self.extra_objects.clear_for_tests();
        self.objects.clear_for_tests();
    }
}
