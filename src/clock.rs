//! Capture-timestamp sources (spec.md §2 "Clock", §5 "Clock" paragraph).
//!
//! A producer's capture timestamp is either a cheap tick counter (lowest
//! latency, needs a conversion callback to become wall-clock nanoseconds)
//! or a wall-clock nanosecond count taken directly. Either way the backend
//! resolves a `capture_timestamp: u64` to nanoseconds-since-epoch via a
//! `TimestampResolver` registered at startup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Produces capture timestamps on the producer thread.
pub trait Clock: Send + Sync {
  /// An opaque, monotonically-nondecreasing-per-thread capture value. May be
  /// a cycle count or already-resolved wall-clock nanoseconds, depending on
  /// the implementation.
  fn capture(&self) -> u64;
}

/// Wall-clock nanoseconds since the Unix epoch. The straightforward, always
///-correct clock; `capture()` values from this clock need no resolution
/// step (the resolver is the identity function).
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  #[inline]
  fn capture(&self) -> u64 {
    now_nanos()
  }
}

/// Nanoseconds since the Unix epoch, read directly from the OS wall clock.
#[inline]
pub fn now_nanos() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .expect("system clock before unix epoch")
    .as_nanos() as u64
}

/// A monotonic counter clock for lowest-latency capture: each call returns
/// a strictly increasing integer with no syscall. Not itself wall-clock
/// meaningful; the backend must resolve it through a registered
/// [`TimestampResolver`].
#[derive(Debug, Default)]
pub struct TickClock {
  next: AtomicU64,
}

impl Clock for TickClock {
  #[inline]
  fn capture(&self) -> u64 {
    self.next.fetch_add(1, Ordering::Relaxed)
  }
}

/// Converts a producer's opaque capture timestamp into nanoseconds since the
/// Unix epoch. Registered once at startup; the backend calls it once per
/// processed event (spec.md §4.5 `get_real_timestamp(event)`).
pub trait TimestampResolver: Send + Sync {
  fn resolve(&self, capture_timestamp: u64) -> u64;
}

/// Resolver for a [`SystemClock`]-driven pipeline: the capture timestamp
/// already *is* nanoseconds since epoch.
#[derive(Debug, Default)]
pub struct IdentityResolver;

impl TimestampResolver for IdentityResolver {
  #[inline]
  fn resolve(&self, capture_timestamp: u64) -> u64 {
    capture_timestamp
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;

  #[test]
  fn system_clock_produces_plausible_epoch_nanos() {
    let clock = SystemClock;
    let ts = clock.capture();
    // Comfortably after 2020-01-01T00:00:00Z in nanoseconds.
    assert!(ts > 1_577_836_800_000_000_000);
  }

  #[test]
  fn tick_clock_is_strictly_increasing() {
    let clock = TickClock::default();
    let a = clock.capture();
    let b = clock.capture();
    let c = clock.capture();
    assert!(a < b && b < c);
  }

  #[test]
  fn identity_resolver_is_identity() {
    let resolver = IdentityResolver;
    assert_eq!(resolver.resolve(12345), 12345);
  }
}
