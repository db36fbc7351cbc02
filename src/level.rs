//! Log severity levels.
//!
//! Quill's level order is wider than a typical five-level scheme: three
//! trace sub-levels below `Debug`, and two sentinels above `Critical` used
//! by the backtrace machinery (`Backtrace`) and by filters that want to
//! silence a handler entirely (`None`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Total order `TraceL3 < TraceL2 < TraceL1 < Debug < Info < Warning < Error
/// < Critical < Backtrace < None`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
  TraceL3 = 0,
  TraceL2 = 1,
  TraceL1 = 2,
  Debug = 3,
  Info = 4,
  Warning = 5,
  Error = 6,
  Critical = 7,
  Backtrace = 8,
  None = 9,
}

impl Level {
  /// Reconstruct a `Level` from its discriminant. Values outside `0..=9`
  /// fall back to `Info`, matching the donor's `LogLevel::from_u8` fallback
  /// convention rather than panicking on a corrupt packed event.
  #[inline]
  pub fn from_u8(v: u8) -> Level {
    match v {
      0 => Level::TraceL3,
      1 => Level::TraceL2,
      2 => Level::TraceL1,
      3 => Level::Debug,
      4 => Level::Info,
      5 => Level::Warning,
      6 => Level::Error,
      7 => Level::Critical,
      8 => Level::Backtrace,
      _ => Level::None,
    }
  }

  /// Fixed-width (9-char, space-padded) form, e.g. `"WARNING  "`.
  pub fn as_padded_str(self) -> &'static str {
    match self {
      Level::TraceL3 => "TRACE_L3 ",
      Level::TraceL2 => "TRACE_L2 ",
      Level::TraceL1 => "TRACE_L1 ",
      Level::Debug => "DEBUG    ",
      Level::Info => "INFO     ",
      Level::Warning => "WARNING  ",
      Level::Error => "ERROR    ",
      Level::Critical => "CRITICAL ",
      Level::Backtrace => "BACKTRACE",
      Level::None => "NONE     ",
    }
  }

  /// Fixed-width (2-char) short form, e.g. `"W"` padded to `"W "`.
  pub fn as_short_str(self) -> &'static str {
    match self {
      Level::TraceL3 => "T3",
      Level::TraceL2 => "T2",
      Level::TraceL1 => "T1",
      Level::Debug => "D ",
      Level::Info => "I ",
      Level::Warning => "W ",
      Level::Error => "E ",
      Level::Critical => "C ",
      Level::Backtrace => "BT",
      Level::None => "N ",
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_padded_str().trim_end())
  }
}

/// An atomically-stored `Level`, used for `Logger::backtrace_flush_level`
/// and any other level gate a producer thread may mutate concurrently with
/// backend reads.
#[derive(Debug)]
pub struct AtomicLevel(AtomicU8);

impl AtomicLevel {
  pub fn new(level: Level) -> Self {
    Self(AtomicU8::new(level as u8))
  }

  /// Release store: pairs with `load`'s acquire per spec.md §5's "release/
  /// acquire between setter thread and backend reader."
  #[inline]
  pub fn store(&self, level: Level) {
    self.0.store(level as u8, Ordering::Release);
  }

  #[inline]
  pub fn load(&self) -> Level {
    Level::from_u8(self.0.load(Ordering::Acquire))
  }
}
