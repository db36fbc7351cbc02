//! Per-handler record filters (spec.md §4.6, §6 "Filter interface"),
//! ported from `examples/original_source/quill/include/quill/filters/LogLevelFilter.h`.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::level::Level;
use crate::macro_metadata::MacroMetadata;

/// A predicate a [`Handler`](crate::handler::Handler) consults before
/// writing a formatted record. Implementations must be cheap: this runs on
/// the backend thread for every candidate event.
pub trait Filter: Send + Sync {
  /// Stable name used to detect duplicate filters on the same handler
  /// (spec.md §7 `ConfigurationError::DuplicateFilterName`).
  fn name(&self) -> &str;

  fn filter(&self, thread_id: u32, log_record_timestamp: u64, metadata: &MacroMetadata, formatted_record: &str) -> bool;
}

/// The only filter the original library ships unconditionally: gates a
/// handler's own minimum level independently of the logger's level.
pub struct LogLevelFilter {
  level: AtomicU8,
}

impl LogLevelFilter {
  pub const NAME: &'static str = "LogLevelFilter";

  pub fn new() -> Self {
    Self {
      level: AtomicU8::new(Level::TraceL3 as u8),
    }
  }

  pub fn set_log_level(&self, level: Level) {
    self.level.store(level as u8, Ordering::Relaxed);
  }

  pub fn log_level(&self) -> Level {
    Level::from_u8(self.level.load(Ordering::Relaxed))
  }
}

impl Default for LogLevelFilter {
  fn default() -> Self {
    Self::new()
  }
}

impl Filter for LogLevelFilter {
  fn name(&self) -> &str {
    Self::NAME
  }

  fn filter(&self, _thread_id: u32, _log_record_timestamp: u64, metadata: &MacroMetadata, _formatted_record: &str) -> bool {
    metadata.level >= self.log_level()
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;

  static META: MacroMetadata = MacroMetadata::new(file!(), 1, "f", "msg", Level::Warning);

  #[test]
  fn defaults_to_trace_l3_so_everything_passes() {
    let filter = LogLevelFilter::new();
    assert!(filter.filter(0, 0, &META, ""));
  }

  #[test]
  fn raising_the_level_blocks_lower_records() {
    let filter = LogLevelFilter::new();
    filter.set_log_level(Level::Error);
    assert!(!filter.filter(0, 0, &META, ""));
  }

  #[test]
  fn name_matches_the_original_identifier() {
    let filter = LogLevelFilter::new();
    assert_eq!(filter.name(), "LogLevelFilter");
  }
}
