//! Compile-time-shaped call-site descriptor (spec.md §3 "MacroMetadata",
//! §6 "MacroMetadata shape").
//!
//! In the original C++ library this is generated by a macro at each call
//! site and lives for `'static` inside the binary's data section. Quill has
//! no macro surface (spec.md §1 Non-goals: "the macro surface... is out of
//! scope"), so callers build a `MacroMetadata` once per call site — a
//! `static MACRO: MacroMetadata = MacroMetadata::new(...)` works identically
//! to the macro-generated original, minus the macro itself.

use crate::level::Level;

/// Immutable, `'static`-friendly descriptor of a single logging call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroMetadata {
  pub file: &'static str,
  pub line: u32,
  pub function: &'static str,
  pub message_format: &'static str,
  pub level: Level,
}

impl MacroMetadata {
  pub const fn new(
    file: &'static str,
    line: u32,
    function: &'static str,
    message_format: &'static str,
    level: Level,
  ) -> Self {
    Self {
      file,
      line,
      function,
      message_format,
      level,
    }
  }

  /// `file` with any leading directory components stripped, by searching
  /// for the last path separator (spec.md §3 "MacroMetadata" — "filename is
  /// derived from pathname by searching for the last path separator").
  /// Accepts both `/` and `\` since `file!()` renders platform-native paths.
  pub fn filename(&self) -> &'static str {
    match self.file.rfind(['/', '\\']) {
      Some(idx) => &self.file[idx + 1..],
      None => self.file,
    }
  }

  /// `"{file}:{line}"`.
  pub fn source_location(&self) -> String {
    format!("{}:{}", self.file, self.line)
  }

  /// `"{filename}:{line}"`, using the stripped [`MacroMetadata::filename`]
  /// rather than the full path.
  pub fn short_source_location(&self) -> String {
    format!("{}:{}", self.filename(), self.line)
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;

  static CALL_SITE: MacroMetadata =
    MacroMetadata::new(file!(), 42, "do_thing", "value was {}", Level::Info);

  #[test]
  fn fields_roundtrip() {
    assert_eq!(CALL_SITE.line, 42);
    assert_eq!(CALL_SITE.function, "do_thing");
    assert_eq!(CALL_SITE.level, Level::Info);
  }

  #[test]
  fn filename_strips_directories() {
    static META: MacroMetadata = MacroMetadata::new("src/backend/worker.rs", 7, "f", "m", Level::Info);
    assert_eq!(META.filename(), "worker.rs");
  }

  #[test]
  fn filename_is_unchanged_with_no_separator() {
    static META: MacroMetadata = MacroMetadata::new("worker.rs", 7, "f", "m", Level::Info);
    assert_eq!(META.filename(), "worker.rs");
  }

  #[test]
  fn short_source_location_uses_filename_not_full_path() {
    static META: MacroMetadata = MacroMetadata::new("src/backend/worker.rs", 7, "f", "m", Level::Info);
    assert_eq!(META.short_source_location(), "worker.rs:7");
    assert_eq!(META.source_location(), "src/backend/worker.rs:7");
  }
}
