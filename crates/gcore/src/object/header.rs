//! Object Header - Layout of GC-managed objects
//!
//! Object Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   ObjectData (collector metadata)       │  <- size/alignment from the
//! │                                         │     active collector's descriptor
//! ├─────────────────────────────────────────┤  <- header_offset
//! │   TypeInfo pointer (8 bytes)            │
//! │   Extra object data pointer (8 bytes)   │  <- AtomicPtr
//! │   [Array element count (4 bytes)]       │  <- arrays only
//! ├─────────────────────────────────────────┤
//! │   Payload                               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Object identity is the header address. The collector metadata region sits
//! directly before the header; its layout is described by an
//! [`ObjectDataDescriptor`] so the allocator can reserve and construct it
//! without knowing the collector's representation.

use super::extra::ExtraObjectData;
use super::type_info::{ElementKind, TypeInfo};
use std::alloc::Layout;
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

/// Alignment of every payload
pub const PAYLOAD_ALIGNMENT: usize = mem::align_of::<AtomicPtr<ObjHeader>>();

/// Payload offset from the header of a plain object
pub const OBJECT_PAYLOAD_OFFSET: usize = round_up(mem::size_of::<ObjHeader>(), PAYLOAD_ALIGNMENT);

/// Payload offset from the header of an array
pub const ARRAY_PAYLOAD_OFFSET: usize = round_up(mem::size_of::<ArrayHeader>(), PAYLOAD_ALIGNMENT);

/// Round `value` up to a multiple of `align` (a power of two)
#[inline]
pub const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Object Header
///
/// Every GC-managed object starts with this header.
#[repr(C)]
pub struct ObjHeader {
    type_info: &'static TypeInfo,
    meta: AtomicPtr<ExtraObjectData>,
}

impl ObjHeader {
    pub(crate) fn new(type_info: &'static TypeInfo) -> Self {
        Self {
            type_info,
            meta: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn type_info(&self) -> &'static TypeInfo {
        self.type_info
    }

    /// Extra object data slot
    pub(crate) fn meta(&self) -> &AtomicPtr<ExtraObjectData> {
        &self.meta
    }
}

/// Array Header
#[repr(C)]
pub struct ArrayHeader {
    header: ObjHeader,
    count: u32,
}

impl ArrayHeader {
    pub(crate) fn new(type_info: &'static TypeInfo, count: u32) -> Self {
        Self {
            header: ObjHeader::new(type_info),
            count,
        }
    }
}

/// Handle to a heap object
///
/// A handle is valid while its object is reachable or still owned by a
/// factory; the collector never relocates objects.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(NonNull<ObjHeader>);

// SAFETY: objects are shared between mutators by design; all mutable state
// behind a handle is atomic.
unsafe impl Send for ObjRef {}
unsafe impl Sync for ObjRef {}

impl ObjRef {
    /// Wrap a raw header pointer
    ///
    /// # Safety
    /// `ptr` must be null or point at a live object header.
    pub unsafe fn from_raw(ptr: *mut ObjHeader) -> Option<Self> {
        NonNull::new(ptr).map(ObjRef)
    }

    pub(crate) fn from_non_null(ptr: NonNull<ObjHeader>) -> Self {
        ObjRef(ptr)
    }

    pub fn as_ptr(self) -> *mut ObjHeader {
        self.0.as_ptr()
    }

    /// Address of the header; the object's identity
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }

    pub fn header(&self) -> &ObjHeader {
        // SAFETY: handles only exist for live objects
        unsafe { self.0.as_ref() }
    }

    pub fn type_info(self) -> &'static TypeInfo {
        self.header().type_info
    }

    pub fn is_array(self) -> bool {
        self.type_info().is_array()
    }

    pub fn as_array(self) -> Option<ArrayRef> {
        if self.is_array() {
            Some(ArrayRef(self.0.cast()))
        } else {
            None
        }
    }

    /// Start of the payload
    pub fn payload(self) -> *mut u8 {
        let offset = if self.is_array() {
            ARRAY_PAYLOAD_OFFSET
        } else {
            OBJECT_PAYLOAD_OFFSET
        };
        // SAFETY: the allocation always extends past the header
        unsafe { self.0.as_ptr().cast::<u8>().add(offset) }
    }

    /// Number of reference fields declared by the type
    pub fn field_count(self) -> usize {
        self.type_info().reference_offsets().len()
    }

    /// Reference field slot `index`
    pub fn field(&self, index: usize) -> &AtomicPtr<ObjHeader> {
        let offset = self.type_info().reference_offsets()[index];
        // SAFETY: offsets were validated against the instance size at allocation
        unsafe { &*self.payload().add(offset).cast::<AtomicPtr<ObjHeader>>() }
    }

    /// All reference field slots
    pub fn reference_fields(&self) -> impl Iterator<Item = &AtomicPtr<ObjHeader>> + '_ {
        (0..self.field_count()).map(move |index| self.field(index))
    }

    pub fn load_field(self, index: usize) -> Option<ObjRef> {
        // SAFETY: slots only ever hold null or live headers
        unsafe { ObjRef::from_raw(self.field(index).load(Ordering::Acquire)) }
    }

    pub fn store_field(self, index: usize, value: Option<ObjRef>) {
        self.field(index).store(to_raw(value), Ordering::Release);
    }

    /// Attached extra object data, if any
    pub fn extra_data(&self) -> Option<&ExtraObjectData> {
        let meta = self.header().meta.load(Ordering::Acquire);
        // SAFETY: installed extra data outlives its installation
        unsafe { meta.as_ref() }
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.type_info().name(), self.address())
    }
}

/// Handle to a heap array
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRef(NonNull<ArrayHeader>);

// SAFETY: see ObjRef
unsafe impl Send for ArrayRef {}
unsafe impl Sync for ArrayRef {}

impl ArrayRef {
    pub fn as_obj(self) -> ObjRef {
        ObjRef(self.0.cast())
    }

    fn header(&self) -> &ArrayHeader {
        // SAFETY: handles only exist for live arrays
        unsafe { self.0.as_ref() }
    }

    pub fn len(self) -> usize {
        self.header().count as usize
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn element_kind(self) -> ElementKind {
        self.header().header.type_info.element()
    }

    /// Start of the element storage
    pub fn data(self) -> *mut u8 {
        // SAFETY: the allocation always extends past the header
        unsafe { self.0.as_ptr().cast::<u8>().add(ARRAY_PAYLOAD_OFFSET) }
    }

    /// Reference element slot `index`; `None` for primitive arrays
    pub fn element(&self, index: usize) -> Option<&AtomicPtr<ObjHeader>> {
        if self.element_kind() != ElementKind::Reference {
            return None;
        }
        assert!(index < self.len(), "array index {} out of bounds", index);
        // SAFETY: index is in bounds and reference elements are slot-sized
        Some(unsafe { &*self.data().cast::<AtomicPtr<ObjHeader>>().add(index) })
    }

    pub fn load_element(self, index: usize) -> Option<ObjRef> {
        let slot = self.element(index)?;
        // SAFETY: slots only ever hold null or live headers
        unsafe { ObjRef::from_raw(slot.load(Ordering::Acquire)) }
    }

    pub fn store_element(self, index: usize, value: Option<ObjRef>) {
        if let Some(slot) = self.element(index) {
            slot.store(to_raw(value), Ordering::Release);
        }
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}]", self.as_obj(), self.len())
    }
}

/// Raw slot value for an optional handle
pub fn to_raw(value: Option<ObjRef>) -> *mut ObjHeader {
    value.map_or(ptr::null_mut(), ObjRef::as_ptr)
}

/// Object Header Protocol
///
/// Describes the collector metadata region embedded before every header.
/// `size` and `alignment` must be constant for the process lifetime.
pub trait ObjectDataDescriptor: Sized + Send + Sync + 'static {
    fn size() -> usize {
        mem::size_of::<Self>()
    }

    fn alignment() -> usize {
        mem::align_of::<Self>()
    }

    /// Construct the metadata in place, unmarked
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `size()` bytes and aligned to
    /// `alignment()`. Called exactly once per object slot.
    unsafe fn construct(ptr: *mut u8) -> *mut Self;
}

/// Captured Object Header Protocol descriptor
#[derive(Clone, Copy)]
pub struct ObjectDataLayout {
    size: usize,
    alignment: usize,
    header_offset: usize,
    construct: unsafe fn(*mut u8),
}

impl ObjectDataLayout {
    pub fn of<D: ObjectDataDescriptor>() -> Self {
        let size = D::size();
        let alignment = D::alignment();
        crate::runtime_assert!(
            alignment.is_power_of_two(),
            "object data alignment {} is not a power of two",
            alignment
        );
        Self {
            size,
            alignment,
            header_offset: header_offset(size),
            construct: construct_erased::<D>,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Distance from the start of the allocation to the header
    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    /// Layout of a whole object with the given header type and payload size
    pub(crate) fn object_layout<H>(&self, payload_size: usize) -> Option<Layout> {
        let data = Layout::from_size_align(self.size, self.alignment).ok()?;
        let (with_header, header_offset) = data.extend(Layout::new::<H>()).ok()?;
        debug_assert_eq!(header_offset, self.header_offset);
        let payload = Layout::from_size_align(payload_size, PAYLOAD_ALIGNMENT).ok()?;
        let (whole, _) = with_header.extend(payload).ok()?;
        Some(whole.pad_to_align())
    }

    /// Construct the metadata at the start of an allocation
    ///
    /// # Safety
    /// `base` must be the start of an allocation made with a layout from
    /// [`Self::object_layout`].
    pub(crate) unsafe fn construct(&self, base: *mut u8) {
        (self.construct)(base)
    }
}

impl PartialEq for ObjectDataLayout {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size
            && self.alignment == other.alignment
            && self.header_offset == other.header_offset
    }
}

impl Eq for ObjectDataLayout {}

impl fmt::Debug for ObjectDataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDataLayout")
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .field("header_offset", &self.header_offset)
            .finish()
    }
}

unsafe fn construct_erased<D: ObjectDataDescriptor>(ptr: *mut u8) {
    D::construct(ptr);
}

const fn header_offset(data_size: usize) -> usize {
    round_up(data_size, mem::align_of::<ObjHeader>())
}

/// Collector metadata of an object
///
/// `D` must be the descriptor the object was allocated with. The borrow is
/// tied to the handle, so it cannot be held past the caller's use of `obj`.
pub fn object_data_for_object<D: ObjectDataDescriptor>(obj: &ObjRef) -> &D {
    let offset = header_offset(D::size());
    // SAFETY: the metadata region precedes the header by `offset` bytes and
    // lives as long as the object the handle refers to
    unsafe { &*obj.as_ptr().cast::<u8>().sub(offset).cast::<D>() }
}
