//! Object Reference Manager
//!
//! [`ObjectRef`] is the only owner of native references on the host side.
//! Every `ObjectRef` holds exactly one native reference and releases it
//! exactly once, in `Drop`, on every exit path.
//!
//! ## Acquire vs. Steal
//!
//! Native calls hand out object handles with two different meanings:
//!
//! - **borrowed**: the caller gets a handle but no reference
//!   (e.g. `value_get_object`). Wrap it with [`ObjectRef::acquire`], which
//!   adds a reference of its own.
//! - **new reference**: the caller now owns one reference
//!   (e.g. `operation_new`, `cache_operation_build`). Wrap it with
//!   [`ObjectRef::steal`], which adopts that reference.
//!
//! Using `acquire` for a new reference leaks; using `steal` for a borrowed
//! handle releases a reference twice.

use std::fmt;
use std::mem::ManuallyDrop;

use opbridge_native::{
    object_ref, object_ref_count, object_type, object_unref, type_is_a, NativeType, ObjectPtr,
};

/// Owning handle to a native object.
pub struct ObjectRef {
    ptr: ObjectPtr,
}

impl ObjectRef {
    /// Wrap a borrowed handle, adding a reference.
    pub fn acquire(ptr: ObjectPtr) -> Self {
        Self {
            ptr: object_ref(ptr),
        }
    }

    /// Adopt a reference the caller already owns.
    pub fn steal(ptr: ObjectPtr) -> Self {
        Self { ptr }
    }

    /// Borrow the raw handle. No reference is added.
    pub fn as_ptr(&self) -> ObjectPtr {
        self.ptr
    }

    /// Give up ownership, returning the raw handle with its reference.
    pub fn into_raw(self) -> ObjectPtr {
        ManuallyDrop::new(self).ptr
    }

    /// Native type of the object
    pub fn type_id(&self) -> NativeType {
        object_type(self.ptr)
    }

    /// Check whether the object is, or derives from, `type_id`
    pub fn is_a(&self, type_id: NativeType) -> bool {
        type_is_a(self.type_id(), type_id)
    }

    /// Current native reference count
    pub fn ref_count(&self) -> usize {
        object_ref_count(self.ptr)
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        Self::acquire(self.ptr)
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        object_unref(self.ptr);
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:p}, {})", self.ptr, self.type_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opbridge_native::{area_new_blob, object_is_alive, types};

    #[test]
    fn test_steal_releases_once() {
        let blob = area_new_blob(b"abc");
        {
            let owned = ObjectRef::steal(blob);
            assert_eq!(owned.ref_count(), 1);
            assert_eq!(owned.type_id(), types::BLOB);
        }
        assert!(!object_is_alive(blob));
    }

    #[test]
    fn test_acquire_adds_reference() {
        let blob = area_new_blob(b"abc");
        let first = ObjectRef::acquire(blob);
        assert_eq!(first.ref_count(), 2);

        let second = first.clone();
        assert_eq!(second.ref_count(), 3);
        assert_eq!(first, second);

        drop(first);
        drop(second);
        assert_eq!(object_ref_count(blob), 1);
        object_unref(blob);
    }

    #[test]
    fn test_into_raw_transfers_reference() {
        let blob = area_new_blob(b"");
        let raw = ObjectRef::steal(blob).into_raw();
        assert_eq!(object_ref_count(raw), 1);
        object_unref(raw);
        assert!(!object_is_alive(raw));
    }

    #[test]
    fn test_is_a() {
        let owned = ObjectRef::steal(area_new_blob(b""));
        assert!(owned.is_a(types::BOXED));
        assert!(!owned.is_a(types::IMAGE));
    }
}
