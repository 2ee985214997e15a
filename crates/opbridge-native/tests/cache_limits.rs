//! Integration tests for the operation cache limit.
//!
//! The cache is process-wide, so everything that changes its limit lives
//! in this one test binary and runs in a single test.

use opbridge_native::*;

fn int_value(n: i32) -> NativeValue {
    let mut value = NativeValue::new();
    value_init(&mut value, types::INT).unwrap();
    value_set_int(&mut value, n).unwrap();
    value
}

/// Build `black width x 1` and return the built handle and the transient one.
fn build_black(width: i32) -> (ObjectPtr, ObjectPtr) {
    let op = operation_new("black").unwrap();
    let mut w = int_value(width);
    let mut h = int_value(1);
    object_set_property(op, "width", &w).unwrap();
    object_set_property(op, "height", &h).unwrap();
    value_unset(&mut w);
    value_unset(&mut h);
    (cache_operation_build(op).unwrap(), op)
}

#[test]
fn test_cache_limit_and_eviction() {
    assert_eq!(cache_get_max(), DEFAULT_CACHE_MAX);

    cache_set_max(2);
    cache_drop_all();
    assert_eq!(cache_get_size(), 0);

    let mut first_ops = Vec::new();
    for width in 1..=3 {
        let (built, op) = build_black(width);
        object_unref(built);
        first_ops.push(op);
    }
    assert_eq!(cache_get_size(), 2);

    // width 1 was evicted, so the cache held its last reference.
    for op in &first_ops {
        object_unref(*op);
    }
    assert!(!object_is_alive(first_ops[0]));
    assert!(object_is_alive(first_ops[2]));

    // A hit hands back the cached instance, not the new operation.
    let (built, op) = build_black(3);
    assert_eq!(built, first_ops[2]);
    object_unref(built);
    object_unref(op);

    cache_set_max(0);
    assert_eq!(cache_get_size(), 0);
    assert!(!object_is_alive(first_ops[2]));

    let (built, op) = build_black(5);
    assert_eq!(built, op);
    assert_eq!(cache_get_size(), 0);
    object_unref(built);
    object_unref(op);
    assert!(!object_is_alive(op));

    assert_eq!(object_stats().invalid_releases, 0);
    cache_set_max(DEFAULT_CACHE_MAX);
}
