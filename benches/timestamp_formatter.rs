//! Benchmarks the cached-timestamp hot path (spec.md §8 "Formatter
//! monotone cache"): repeatedly formatting a strictly increasing sequence
//! of timestamps should cost an offset patch, not a fresh `strftime` call.
//! Styled after the donor's `ttlog-benches/distributed_bench.rs` —
//! `criterion_group!`/`criterion_main!` with a tuned `Criterion` config,
//! `BenchmarkId` for the parameterized cases.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quill::timestamp_formatter::{Timezone, TimestampFormatter};

fn configure_criterion() -> Criterion {
  Criterion::default()
    .sample_size(50)
    .measurement_time(Duration::from_secs(5))
    .warm_up_time(Duration::from_secs(1))
}

const BASE_NS: u64 = 1_587_161_887_000_000_000;

/// The steady-state case: every call lands within the same recalculation
/// window, so `format_timestamp` only ever patches H/M/S byte offsets.
fn bench_monotone_second_advance(c: &mut Criterion) {
  let mut group = c.benchmark_group("timestamp_formatter_monotone");

  for pattern in ["%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%H:%M:%S.%Qms"] {
    group.bench_with_input(BenchmarkId::new("pattern", pattern), &pattern, |b, &pattern| {
      let mut tf = TimestampFormatter::new(pattern, Timezone::GmtTime).unwrap();
      let mut i = 0u64;
      b.iter(|| {
        i += 1;
        tf.format_timestamp(BASE_NS + i * 1_000_000_000)
      });
    });
  }

  group.finish();
}

/// Crossing an hourly (local) or noon/midnight (GMT) boundary forces a full
/// recalculation once every many calls; this measures the amortized cost
/// across a run that crosses several boundaries.
fn bench_crossing_recalculation_boundary(c: &mut Criterion) {
  let mut group = c.benchmark_group("timestamp_formatter_boundary_crossing");

  group.bench_function("gmt_noon_midnight", |b| {
    let mut tf = TimestampFormatter::new("%H:%M:%S", Timezone::GmtTime).unwrap();
    let mut i = 0u64;
    b.iter(|| {
      i += 1;
      // ~4.2 hours per step keeps us crossing a noon/midnight boundary
      // roughly every three iterations.
      tf.format_timestamp(BASE_NS + i * 15_000 * 1_000_000_000)
    });
  });

  group.finish();
}

/// The uncached path: a format string with no `%H`/`%M`/`%S`/etc field at
/// all degrades to a full `strftime`-equivalent render every call.
fn bench_literal_only_pattern(c: &mut Criterion) {
  c.bench_function("timestamp_formatter_literal_only", |b| {
    let mut tf = TimestampFormatter::new("request completed", Timezone::GmtTime).unwrap();
    b.iter(|| tf.format_timestamp(BASE_NS));
  });
}

criterion_group! {
  name = benches;
  config = configure_criterion();
  targets = bench_monotone_second_advance, bench_crossing_recalculation_boundary, bench_literal_only_pattern,
}

criterion_main!(benches);
