//! Native Object System
//!
//! This module provides the reference-counted object table behind every
//! native object: images, boxed areas (blobs and arrays) and operations.
//!
//! ## Ownership Model
//!
//! Objects are addressed through [`ObjectPtr`], a plain copyable handle
//! that carries no ownership at all, exactly like a raw `GObject *`.
//! Ownership is tracked by the reference count in the table:
//!
//! - `object_new` returns a handle holding one reference
//! - [`object_ref`] adds a reference and returns the same handle
//! - [`object_unref`] drops a reference; the object is finalised when the
//!   count reaches zero
//!
//! Handles are never reused. Releasing a dead handle does not corrupt
//! anything: it is logged and counted in [`ObjectStats::invalid_releases`],
//! which lets tests prove that no reference was released twice.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::area::Area;
use crate::error::{raise, NativeError, NativeResult};
use crate::image::ImageData;
use crate::operation::OperationData;
use crate::types::{self, NativeType};

// ============================================================================
// ObjectPtr - Opaque Object Handle
// ============================================================================

/// Opaque handle to a native object.
///
/// Copying an `ObjectPtr` does not add a reference; see [`object_ref`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectPtr(NonZeroU64);

impl ObjectPtr {
    /// Rebuild a handle from its raw address.
    ///
    /// Returns `None` for zero, the null handle.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw address of this handle
    pub fn addr(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPtr(0x{:x})", self.0)
    }
}

impl fmt::Pointer for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

// ============================================================================
// Object Payloads
// ============================================================================

/// Payload stored behind an object handle
pub(crate) enum ObjectData {
    Image(ImageData),
    Area(Area),
    Operation(Mutex<OperationData>),
}

impl ObjectData {
    pub(crate) fn as_image(&self) -> Option<&ImageData> {
        match self {
            ObjectData::Image(image) => Some(image),
            _ => None,
        }
    }

    pub(crate) fn as_area(&self) -> Option<&Area> {
        match self {
            ObjectData::Area(area) => Some(area),
            _ => None,
        }
    }

    pub(crate) fn as_operation(&self) -> Option<&Mutex<OperationData>> {
        match self {
            ObjectData::Operation(op) => Some(op),
            _ => None,
        }
    }

    /// Release every reference this object holds on other objects.
    fn finalize(&self) {
        match self {
            ObjectData::Image(_) => {}
            ObjectData::Area(area) => area.finalize(),
            ObjectData::Operation(op) => op.lock().finalize(),
        }
    }
}

// ============================================================================
// Object Table
// ============================================================================

struct Slot {
    type_id: NativeType,
    ref_count: usize,
    data: Arc<ObjectData>,
}

struct ObjectTable {
    slots: Mutex<HashMap<u64, Slot>>,
    next_handle: AtomicU64,
    total_created: AtomicU64,
    invalid_releases: AtomicU64,
}

fn table() -> &'static ObjectTable {
    static TABLE: OnceLock<ObjectTable> = OnceLock::new();
    TABLE.get_or_init(|| ObjectTable {
        slots: Mutex::new(HashMap::new()),
        next_handle: AtomicU64::new(0x1000),
        total_created: AtomicU64::new(0),
        invalid_releases: AtomicU64::new(0),
    })
}

/// Register a new object. The returned handle holds one reference.
pub(crate) fn object_new(type_id: NativeType, data: ObjectData) -> ObjectPtr {
    let table = table();
    let handle = NonZeroU64::MIN.saturating_add(table.next_handle.fetch_add(1, Ordering::Relaxed));
    table.total_created.fetch_add(1, Ordering::Relaxed);
    table.slots.lock().insert(
        handle.get(),
        Slot {
            type_id,
            ref_count: 1,
            data: Arc::new(data),
        },
    );
    tracing::trace!(handle = handle.get(), ty = %type_id, "object created");
    ObjectPtr(handle)
}

/// Add a reference to an object and return the same handle.
pub fn object_ref(ptr: ObjectPtr) -> ObjectPtr {
    let table = table();
    let found = match table.slots.lock().get_mut(&ptr.addr()) {
        Some(slot) => {
            slot.ref_count += 1;
            true
        }
        None => false,
    };
    if !found {
        table.invalid_releases.fetch_add(1, Ordering::Relaxed);
        tracing::error!(handle = ?ptr, "object_ref on a dead object");
    }
    ptr
}

/// Drop a reference to an object, finalising it when none remain.
pub fn object_unref(ptr: ObjectPtr) {
    let table = table();
    let finalized = {
        let mut slots = table.slots.lock();
        let remaining = slots.get_mut(&ptr.addr()).map(|slot| {
            slot.ref_count -= 1;
            slot.ref_count
        });
        match remaining {
            Some(0) => slots.remove(&ptr.addr()),
            Some(_) => None,
            None => {
                drop(slots);
                table.invalid_releases.fetch_add(1, Ordering::Relaxed);
                tracing::error!(handle = ?ptr, "object_unref on a dead object");
                return;
            }
        }
    };

    // Finalisation may release other objects, so it runs outside the table lock.
    if let Some(slot) = finalized {
        tracing::trace!(handle = ?ptr, ty = %slot.type_id, "object finalized");
        slot.data.finalize();
    }
}

/// Current reference count of an object, zero once it has been finalised.
pub fn object_ref_count(ptr: ObjectPtr) -> usize {
    table()
        .slots
        .lock()
        .get(&ptr.addr())
        .map(|slot| slot.ref_count)
        .unwrap_or(0)
}

/// Check whether a handle still refers to a live object.
pub fn object_is_alive(ptr: ObjectPtr) -> bool {
    table().slots.lock().contains_key(&ptr.addr())
}

/// Type of a live object, or [`types::INVALID`] for a dead handle.
pub fn object_type(ptr: ObjectPtr) -> NativeType {
    table()
        .slots
        .lock()
        .get(&ptr.addr())
        .map(|slot| slot.type_id)
        .unwrap_or(types::INVALID)
}

/// Borrow the payload of a live object.
pub(crate) fn object_data(ptr: ObjectPtr) -> NativeResult<Arc<ObjectData>> {
    let data = table()
        .slots
        .lock()
        .get(&ptr.addr())
        .map(|slot| Arc::clone(&slot.data));
    match data {
        Some(data) => Ok(data),
        None => raise(NativeError::InvalidObject { handle: ptr.addr() }),
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Object table statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStats {
    /// Objects currently alive
    pub live_objects: usize,
    /// Objects created since process start
    pub total_created: u64,
    /// `object_ref`/`object_unref` calls made on dead handles
    pub invalid_releases: u64,
}

/// Get statistics about the object table.
pub fn object_stats() -> ObjectStats {
    let table = table();
    ObjectStats {
        live_objects: table.slots.lock().len(),
        total_created: table.total_created.load(Ordering::Relaxed),
        invalid_releases: table.invalid_releases.load(Ordering::Relaxed),
    }
}

impl fmt::Display for ObjectStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Object Stats: live={}, created={}, invalid_releases={}",
            self.live_objects, self.total_created, self.invalid_releases
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::area_new_blob;

    #[test]
    fn test_ref_unref_lifecycle() {
        let blob = area_new_blob(b"abc");
        assert_eq!(object_ref_count(blob), 1);
        assert_eq!(object_type(blob), types::BLOB);

        assert_eq!(object_ref(blob), blob);
        assert_eq!(object_ref_count(blob), 2);

        object_unref(blob);
        assert_eq!(object_ref_count(blob), 1);
        assert!(object_is_alive(blob));

        object_unref(blob);
        assert_eq!(object_ref_count(blob), 0);
        assert!(!object_is_alive(blob));
        assert_eq!(object_type(blob), types::INVALID);
    }

    #[test]
    fn test_release_of_dead_handle_is_counted() {
        let blob = area_new_blob(b"");
        object_unref(blob);

        let before = object_stats().invalid_releases;
        object_unref(blob);
        assert!(object_stats().invalid_releases > before);
    }

    #[test]
    fn test_object_data_on_dead_handle() {
        let ptr = ObjectPtr::from_raw(1).unwrap();
        assert!(matches!(
            object_data(ptr),
            Err(NativeError::InvalidObject { handle: 1 })
        ));
        crate::error::error_clear();
    }

    #[test]
    fn test_null_handle() {
        assert!(ObjectPtr::from_raw(0).is_none());
        let ptr = ObjectPtr::from_raw(0x2a).unwrap();
        assert_eq!(format!("{:?}", ptr), "ObjectPtr(0x2a)");
    }
}
