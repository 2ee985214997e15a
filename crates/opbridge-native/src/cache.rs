//! Operation Cache
//!
//! Built operations are remembered by nickname plus the text form of their
//! inputs. When an equivalent operation is built again, the cached
//! instance is returned instead and the new one is left unbuilt. The cache
//! holds one reference per entry and evicts least recently used entries
//! once it grows past its limit.

use std::sync::OnceLock;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::{raise, NativeError, NativeResult};
use crate::object::{object_data, object_ref, object_type, object_unref, ObjectPtr};

/// Default number of cached operations
pub const DEFAULT_CACHE_MAX: usize = 100;

struct OperationCache {
    entries: IndexMap<String, ObjectPtr>,
    max: usize,
}

impl OperationCache {
    /// Remove entries beyond the limit, returning their references.
    fn trim(&mut self) -> Vec<ObjectPtr> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.max {
            match self.entries.shift_remove_index(0) {
                Some((_, ptr)) => evicted.push(ptr),
                None => break,
            }
        }
        evicted
    }
}

fn cache() -> &'static Mutex<OperationCache> {
    static CACHE: OnceLock<Mutex<OperationCache>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(OperationCache {
            entries: IndexMap::new(),
            max: DEFAULT_CACHE_MAX,
        })
    })
}

fn release(evicted: Vec<ObjectPtr>) {
    for ptr in evicted {
        object_unref(ptr);
    }
}

/// Set the maximum number of cached operations, evicting as needed.
pub fn cache_set_max(max: usize) {
    let evicted = {
        let mut cache = cache().lock();
        cache.max = max;
        cache.trim()
    };
    tracing::debug!(max, evicted = evicted.len(), "operation cache limit set");
    release(evicted);
}

/// Current cache limit.
pub fn cache_get_max() -> usize {
    cache().lock().max
}

/// Number of cached operations.
pub fn cache_get_size() -> usize {
    cache().lock().entries.len()
}

/// Drop every cached operation.
pub fn cache_drop_all() {
    let evicted: Vec<ObjectPtr> = {
        let mut cache = cache().lock();
        cache.entries.drain(..).map(|(_, ptr)| ptr).collect()
    };
    release(evicted);
}

/// Return a new reference to a cached operation, refreshing its position.
fn lookup(key: &str) -> Option<ObjectPtr> {
    let mut cache = cache().lock();
    let ptr = cache.entries.shift_remove(key)?;
    cache.entries.insert(key.to_string(), ptr);
    Some(object_ref(ptr))
}

/// Insert a built operation, taking a new reference to it.
fn insert(key: String, ptr: ObjectPtr) {
    let evicted = {
        let mut cache = cache().lock();
        if cache.max == 0 {
            Vec::new()
        } else {
            let previous = cache.entries.insert(key, object_ref(ptr));
            let mut evicted = cache.trim();
            evicted.extend(previous);
            evicted
        }
    };
    release(evicted);
}

/// Build an operation, or swap it for an equivalent cached one.
///
/// Returns a new reference: either to `op` itself once built, or to a
/// previously built operation with the same inputs. The caller still owns
/// its reference to `op` and must release it either way. On failure
/// nothing is cached and the error buffer holds the reason.
pub fn cache_operation_build(op: ObjectPtr) -> NativeResult<ObjectPtr> {
    let data = object_data(op)?;
    let mutex = match data.as_operation() {
        Some(mutex) => mutex,
        None => return raise(NativeError::type_mismatch("Operation", object_type(op).name())),
    };

    let (nickname, built, key) = {
        let state = mutex.lock();
        (state.nickname(), state.is_built(), state.cache_key())
    };
    if built {
        return Ok(object_ref(op));
    }

    if let Some(key) = &key {
        if let Some(hit) = lookup(key) {
            tracing::debug!(operation = nickname, "operation cache hit");
            return Ok(hit);
        }
    }

    mutex.lock().build()?;
    tracing::debug!(operation = nickname, cached = key.is_some(), "operation built");

    if let Some(key) = key {
        insert(key, op);
    }
    Ok(object_ref(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_clear;
    use crate::operation::{object_set_property, operation_new};
    use crate::types;
    use crate::value::{value_init, value_set_int, NativeValue};

    fn int_value(n: i32) -> NativeValue {
        let mut value = NativeValue::new();
        value_init(&mut value, types::INT).unwrap();
        value_set_int(&mut value, n).unwrap();
        value
    }

    fn black(width: i32, height: i32) -> ObjectPtr {
        let op = operation_new("black").unwrap();
        object_set_property(op, "width", &int_value(width)).unwrap();
        object_set_property(op, "height", &int_value(height)).unwrap();
        op
    }

    #[test]
    fn test_equivalent_build_reuses_instance() {
        // Sizes unique to this test keep other tests from sharing the entry.
        let first = black(17, 3);
        let built = cache_operation_build(first).unwrap();
        assert_eq!(built, first);

        let second = black(17, 3);
        let reused = cache_operation_build(second).unwrap();
        assert_eq!(reused, first);

        for ptr in [first, built, second, reused] {
            object_unref(ptr);
        }
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let op = operation_new("black").unwrap();
        object_set_property(op, "width", &int_value(4)).unwrap();
        assert!(cache_operation_build(op).is_err());
        assert!(!crate::error::error_buffer().is_empty());
        object_unref(op);
        error_clear();
    }

    #[test]
    fn test_non_operation_rejected() {
        let blob = crate::area::area_new_blob(b"x");
        assert!(cache_operation_build(blob).is_err());
        object_unref(blob);
        error_clear();
    }
}
