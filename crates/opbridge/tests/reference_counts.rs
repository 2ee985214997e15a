//! Reference discipline across the call pipeline.
//!
//! The native operation cache keeps outputs alive, so this binary turns
//! the cache off before doing any work. Everything runs in one test to
//! keep other tests from racing on the process-wide counters.

use opbridge::native::{cache_get_size, object_is_alive, object_stats};
use opbridge::{call, init, BandFormat, BridgeConfig, CallOptions, FromValue, Image, Value};
use pretty_assertions::assert_eq;

#[test]
fn test_reference_discipline() {
    init(BridgeConfig::new().with_operation_cache_max(0));
    assert_eq!(cache_get_size(), 0);
    let invalid_before = object_stats().invalid_releases;

    let input = Image::from_memory(3, 3, 1, BandFormat::UChar, vec![1.0; 9]).unwrap();
    let options = CallOptions::new();

    // N calls, each producing one image: exactly one caller reference each.
    let outputs: Vec<Image> = (0..8)
        .map(|_| {
            let result = input.call("invert", &[], &options).unwrap();
            Image::from_value(&result).unwrap()
        })
        .collect();
    for out in &outputs {
        assert_eq!(out.object().ref_count(), 1);
    }
    assert_eq!(input.object().ref_count(), 1);

    let handles: Vec<_> = outputs.iter().map(|image| image.object().as_ptr()).collect();
    drop(outputs);
    assert!(handles.iter().all(|&ptr| !object_is_alive(ptr)));

    // Failed calls release what they acquired.
    let small = Image::from_memory(1, 1, 1, BandFormat::UChar, vec![0.0]).unwrap();
    for _ in 0..4 {
        assert!(input.call("add", &[Value::Image(small.clone())], &options).is_err());
        assert!(input.call("add", &["text".into()], &options).is_err());
    }
    assert_eq!(small.object().ref_count(), 1);
    assert_eq!(input.object().ref_count(), 1);

    // Modify arguments work on a private copy.
    let drawn = input
        .call(
            "draw_rect",
            &[vec![0.0].into(), 0.into(), 0.into(), 1.into(), 1.into()],
            &options,
        )
        .unwrap();
    assert_eq!(input.object().ref_count(), 1);
    let drawn = Image::from_value(&drawn).unwrap();
    assert_eq!(drawn.object().ref_count(), 1);

    // Arrays of images hold one reference per element while bound only.
    let joined = call(
        "bandjoin",
        &[Value::Array(vec![Value::Image(input.clone()), Value::Image(input.clone())])],
        &options,
    )
    .unwrap();
    assert_eq!(Image::from_value(&joined).unwrap().bands(), 2);
    assert_eq!(input.object().ref_count(), 1);

    let input_handle = input.object().as_ptr();
    drop(joined);
    drop(drawn);
    drop(input);
    drop(small);
    assert!(!object_is_alive(input_handle));
    assert_eq!(object_stats().invalid_releases, invalid_before);
}
