//! opbridge Benchmarks
//!
//! Timings for operation calls, variant value conversion and manifest lookups.
//! Run with: cargo bench -p opbridge-benchmarks

// Empty lib target; the benchmark groups live in benches/call_benchmarks.rs.
