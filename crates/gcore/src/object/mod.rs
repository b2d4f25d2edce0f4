//! Object Module - heap object model
//!
//! Headers, type descriptors, the collector metadata protocol and extra
//! object data records.

pub mod extra;
pub mod header;
pub mod type_info;

pub use extra::{AssociatedObject, ExtraObjectData, ExtraRef};
pub use header::{
    object_data_for_object, ArrayHeader, ArrayRef, ObjHeader, ObjRef, ObjectDataDescriptor,
    ObjectDataLayout,
};
pub use type_info::{ElementKind, Finalizer, TypeInfo, REFERENCE_SIZE};
