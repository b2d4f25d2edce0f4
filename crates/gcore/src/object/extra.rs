//! Extra Object Data - auxiliary per-object records
//!
//! An object gets at most one extra data record, created on first need
//! (an associated native resource, a weak reference). The record is linked
//! from the object header and owned by a factory; it is destroyed either
//! explicitly or by the sweep phase.
//!
//! Flags:
//! - SWEEPABLE: never attached (or detached early); the next sweep frees it
//! - FINALIZED: torn down; the next sweep frees it
//! - RELEASED: the associated resource has been dropped

use super::header::{to_raw, ObjRef};
use super::type_info::TypeInfo;
use super::ObjHeader;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

pub const FLAG_SWEEPABLE: u32 = 1 << 0;
pub const FLAG_FINALIZED: u32 = 1 << 1;
pub const FLAG_RELEASED: u32 = 1 << 2;

/// Native resource owned on behalf of a heap object
pub type AssociatedObject = Box<dyn Any + Send>;

/// ExtraObjectData - side record attached to one object
pub struct ExtraObjectData {
    base_object: AtomicPtr<ObjHeader>,
    type_info: &'static TypeInfo,
    flags: AtomicU32,
    associated: Mutex<Option<AssociatedObject>>,
    weak_referent: AtomicPtr<ObjHeader>,
}

impl ExtraObjectData {
    pub(crate) fn new(base: ObjRef, type_info: &'static TypeInfo) -> Self {
        Self {
            base_object: AtomicPtr::new(base.as_ptr()),
            type_info,
            flags: AtomicU32::new(0),
            associated: Mutex::new(None),
            weak_referent: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Object this record belongs to; `None` once uninstalled
    pub fn base_object(&self) -> Option<ObjRef> {
        // SAFETY: the base pointer is cleared before its object is freed
        unsafe { ObjRef::from_raw(self.base_object.load(Ordering::Acquire)) }
    }

    /// Type the record was created for
    pub fn type_info(&self) -> &'static TypeInfo {
        self.type_info
    }

    /// Link this record from its base object's header
    ///
    /// Aborts if the object already has extra data.
    pub(crate) fn install(&self) {
        let Some(base) = self.base_object() else {
            crate::runtime_fail!("installing extra object data without a base object");
        };
        let this = self as *const Self as *mut Self;
        if base
            .header()
            .meta()
            .compare_exchange(ptr::null_mut(), this, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            crate::runtime_fail!("extra object data already exists for {:?}", base);
        }
    }

    /// Unlink from the base object; idempotent
    pub(crate) fn uninstall(&self) {
        let base = self.base_object.swap(ptr::null_mut(), Ordering::AcqRel);
        // SAFETY: a non-null base is still live
        if let Some(base) = unsafe { ObjRef::from_raw(base) } {
            let this = self as *const Self as *mut Self;
            let _ = base.header().meta().compare_exchange(
                this,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    pub fn is_installed(&self) -> bool {
        !self.base_object.load(Ordering::Acquire).is_null()
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags() & flag != 0
    }

    /// Set `flag`, returning whether it was already set
    pub fn set_flag(&self, flag: u32) -> bool {
        self.flags.fetch_or(flag, Ordering::AcqRel) & flag != 0
    }

    pub fn is_sweepable(&self) -> bool {
        self.has_flag(FLAG_SWEEPABLE)
    }

    pub fn is_finalized(&self) -> bool {
        self.has_flag(FLAG_FINALIZED)
    }

    /// Whether the next sweep may free this record
    pub(crate) fn is_reclaimable(&self) -> bool {
        self.has_flag(FLAG_SWEEPABLE | FLAG_FINALIZED)
    }

    /// Attach a native resource, replacing any previous one
    pub fn set_associated_object(&self, object: AssociatedObject) -> Option<AssociatedObject> {
        self.associated.lock().replace(object)
    }

    pub fn has_associated_object(&self) -> bool {
        self.associated.lock().is_some()
    }

    /// Detach the native resource and flag it released
    pub fn release_associated_object(&self) -> Option<AssociatedObject> {
        let released = self.associated.lock().take();
        self.set_flag(FLAG_RELEASED);
        released
    }

    /// Start tracking the base object weakly
    pub fn enable_weak_reference(&self) {
        self.weak_referent
            .store(self.base_object.load(Ordering::Acquire), Ordering::Release);
    }

    /// Weak referent snapshot
    ///
    /// Relaxed read: may race with the sweep clearing it, so callers must
    /// re-validate at a safepoint before trusting the object.
    pub fn weak_referent(&self) -> Option<ObjRef> {
        // SAFETY: the referent is cleared before the object is freed
        unsafe { ObjRef::from_raw(self.weak_referent.load(Ordering::Relaxed)) }
    }

    pub(crate) fn clear_weak_referent(&self) {
        self.weak_referent.store(to_raw(None), Ordering::Release);
    }
}

impl fmt::Debug for ExtraObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtraObjectData")
            .field("type", &self.type_info.name())
            .field("installed", &self.is_installed())
            .field("flags", &self.flags())
            .finish()
    }
}

/// Handle to an extra data record owned by a factory
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtraRef(NonNull<ExtraObjectData>);

// SAFETY: ExtraObjectData is Sync; the handle is just its address
unsafe impl Send for ExtraRef {}
unsafe impl Sync for ExtraRef {}

impl ExtraRef {
    pub(crate) fn new(extra: &ExtraObjectData) -> Self {
        Self(NonNull::from(extra))
    }

    /// Factory key
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl Deref for ExtraRef {
    type Target = ExtraObjectData;

    fn deref(&self) -> &ExtraObjectData {
        // SAFETY: handles are not used after their record is destroyed
        unsafe { self.0.as_ref() }
    }
}

impl fmt::Debug for ExtraRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtraRef({:#x})", self.address())
    }
}
