//! Call Pipeline Benchmarks
//!
//! This module benchmarks the dynamic invocation layer:
//! - Manifest lookups (cached and rebuilt)
//! - Variant value conversion
//! - Whole calls, with and without the native operation cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use opbridge::native::{cache_set_max, types, DEFAULT_CACHE_MAX};
use opbridge::{call, flush, introspect, BandFormat, CallOptions, Image, Value, VariantValue};

fn image(size: usize) -> Image {
    let pixels = (0..size * size).map(|i| (i % 256) as f64).collect();
    Image::from_memory(size, size, 1, BandFormat::UChar, pixels).expect("benchmark image")
}

// ============================================================================
// Introspection
// ============================================================================

fn bench_introspection(c: &mut Criterion) {
    let mut group = c.benchmark_group("introspection");

    group.bench_function("cached", |b| {
        introspect("linear").expect("linear exists");
        b.iter(|| black_box(introspect(black_box("linear"))))
    });

    group.bench_function("rebuilt", |b| {
        b.iter(|| {
            flush();
            black_box(introspect(black_box("linear")))
        })
    });

    group.finish();
}

// ============================================================================
// Variant Values
// ============================================================================

fn bench_variant_values(c: &mut Criterion) {
    let mut group = c.benchmark_group("variant_value");

    let cases = [
        ("int", types::INT, Value::Int(42)),
        ("enum_nick", types::BAND_FORMAT, Value::String("ushort".into())),
        (
            "array_double",
            types::ARRAY_DOUBLE,
            Value::Array((0..16).map(|i| Value::Double(i as f64)).collect()),
        ),
        ("blob", types::BLOB, Value::bytes(vec![0u8; 1024])),
        ("image", types::IMAGE, Value::Image(image(8))),
    ];

    for (name, type_id, value) in cases.iter() {
        group.bench_with_input(BenchmarkId::new("set_get", name), value, |b, value| {
            b.iter(|| {
                let variant = VariantValue::from_value(*type_id, black_box(value));
                black_box(variant.and_then(|v| v.get()))
            })
        });
    }

    group.finish();
}

// ============================================================================
// Calls
// ============================================================================

fn bench_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("call");
    let options = CallOptions::new();

    for size in [8usize, 64] {
        let input = image(size);

        cache_set_max(DEFAULT_CACHE_MAX);
        group.bench_with_input(BenchmarkId::new("invert_cached", size), &input, |b, input| {
            b.iter(|| black_box(input.call("invert", &[], &options)))
        });

        cache_set_max(0);
        group.bench_with_input(BenchmarkId::new("invert_uncached", size), &input, |b, input| {
            b.iter(|| black_box(input.call("invert", &[], &options)))
        });

        group.bench_with_input(BenchmarkId::new("add_constant", size), &input, |b, input| {
            b.iter(|| black_box(input.call("add", &[Value::Int(1)], &options)))
        });
    }

    group.bench_function("black_with_option", |b| {
        let options = CallOptions::new().with("bands", 3);
        b.iter(|| black_box(call("black", &[16.into(), 16.into()], &options)))
    });

    cache_set_max(DEFAULT_CACHE_MAX);
    group.finish();
}

// ============================================================================
// Criterion Main
// ============================================================================

criterion_group!(benches, bench_introspection, bench_variant_values, bench_calls);

criterion_main!(benches);
