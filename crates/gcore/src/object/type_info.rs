//! Type Descriptors
//!
//! Static shape metadata for heap objects. A `TypeInfo` tells the allocator
//! how large an instance payload is, and tells the mark phase where the
//! reference slots live.

use super::ObjRef;
use std::mem;
use std::sync::atomic::AtomicPtr;

/// Finalizer routine run once for a garbage object before it is freed
pub type Finalizer = fn(ObjRef);

/// Size of one reference slot in a payload
pub const REFERENCE_SIZE: usize = mem::size_of::<AtomicPtr<super::ObjHeader>>();

/// Element kind of an array type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Not an array
    None,
    /// Array of plain data elements of the given size in bytes
    Primitive(usize),
    /// Array of object references
    Reference,
}

impl ElementKind {
    /// Size of one element in bytes
    pub const fn size(&self) -> usize {
        match self {
            ElementKind::None => 0,
            ElementKind::Primitive(size) => *size,
            ElementKind::Reference => REFERENCE_SIZE,
        }
    }
}

/// TypeInfo - static type descriptor
///
/// # Examples
///
/// ```rust
/// use gcore::object::{ElementKind, TypeInfo};
///
/// static NODE: TypeInfo = TypeInfo::object("Node", 16, &[0, 8]);
/// static BYTES: TypeInfo = TypeInfo::array("ByteArray", ElementKind::Primitive(1));
///
/// assert_eq!(NODE.reference_offsets().len(), 2);
/// assert!(BYTES.is_array());
/// ```
#[derive(Debug)]
pub struct TypeInfo {
    name: &'static str,
    instance_size: usize,
    reference_offsets: &'static [usize],
    element: ElementKind,
    finalizer: Option<Finalizer>,
}

impl TypeInfo {
    /// Plain object type with `instance_size` payload bytes
    ///
    /// `reference_offsets` are payload byte offsets of reference slots; each
    /// must be a multiple of [`REFERENCE_SIZE`] and leave room for a slot.
    pub const fn object(
        name: &'static str,
        instance_size: usize,
        reference_offsets: &'static [usize],
    ) -> Self {
        Self {
            name,
            instance_size,
            reference_offsets,
            element: ElementKind::None,
            finalizer: None,
        }
    }

    /// Array type; the payload size comes from the element count
    pub const fn array(name: &'static str, element: ElementKind) -> Self {
        Self {
            name,
            instance_size: 0,
            reference_offsets: &[],
            element,
            finalizer: None,
        }
    }

    /// Attach a finalizer
    pub const fn with_finalizer(mut self, finalizer: Finalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn instance_size(&self) -> usize {
        self.instance_size
    }

    pub fn reference_offsets(&self) -> &'static [usize] {
        self.reference_offsets
    }

    pub fn element(&self) -> ElementKind {
        self.element
    }

    pub fn finalizer(&self) -> Option<Finalizer> {
        self.finalizer
    }

    pub fn is_array(&self) -> bool {
        self.element != ElementKind::None
    }

    /// Whether instances can hold references the mark phase must follow
    pub fn has_references(&self) -> bool {
        match self.element {
            ElementKind::None => !self.reference_offsets.is_empty(),
            ElementKind::Reference => true,
            ElementKind::Primitive(_) => false,
        }
    }

    /// Payload size for an instance with `count` elements
    ///
    /// Returns `None` on overflow.
    pub fn payload_size(&self, count: usize) -> Option<usize> {
        if self.is_array() {
            self.element.size().checked_mul(count)
        } else {
            Some(self.instance_size)
        }
    }

    /// Check the reference offsets against the instance size
    pub(crate) fn validate_layout(&self) -> bool {
        self.reference_offsets.iter().all(|&offset| {
            offset % REFERENCE_SIZE == 0 && offset + REFERENCE_SIZE <= self.instance_size
        })
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for TypeInfo {}
