//! Minimal concrete implementation of the external `PatternFormatter`
//! contract (spec.md §6 "PatternFormatter interface").
//!
//! spec.md treats the full template-expansion engine as an external
//! collaborator and only specifies its placeholder vocabulary. This module
//! provides just enough of that contract — literal text interleaved with a
//! closed set of `%(...)` placeholders, each usable at most once — for the
//! crate to be buildable and testable end to end; it is not a general
//! templating engine.

use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::macro_metadata::MacroMetadata;
use crate::timestamp_formatter::{Timezone, TimestampFormatter};

/// Everything a [`PatternFormatter`] needs to render one record (spec.md
/// §6's `format(...)` parameter list, bundled into a struct rather than a
/// long positional argument list).
pub struct FormatContext<'a> {
  pub ns_since_epoch: u64,
  pub thread_id: u32,
  pub thread_name: &'a str,
  pub process_id: u32,
  pub logger_name: &'a str,
  pub metadata: &'a MacroMetadata,
  /// Key/value pairs captured alongside a structured log call.
  pub structured_kvs: &'a [(Arc<str>, String)],
  /// Freeform tags attached at the logger or handler level, independent of
  /// any single call's structured arguments.
  pub custom_tags: &'a [(Arc<str>, String)],
  pub formatted_message: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
  Time,
  FileName,
  FullPath,
  CallerFunction,
  LogLevel,
  LogLevelId,
  LineNumber,
  Logger,
  Message,
  ThreadId,
  ThreadName,
  ProcessId,
  SourceLocation,
  ShortSourceLocation,
  CustomTags,
  StructuredKeys,
}

const PLACEHOLDERS: &[(Placeholder, &str)] = &[
  (Placeholder::Time, "time"),
  (Placeholder::FileName, "file_name"),
  (Placeholder::FullPath, "full_path"),
  (Placeholder::CallerFunction, "caller_function"),
  (Placeholder::LogLevel, "log_level"),
  (Placeholder::LogLevelId, "log_level_id"),
  (Placeholder::LineNumber, "line_number"),
  (Placeholder::Logger, "logger"),
  (Placeholder::Message, "message"),
  (Placeholder::ThreadId, "thread_id"),
  (Placeholder::ThreadName, "thread_name"),
  (Placeholder::ProcessId, "process_id"),
  (Placeholder::SourceLocation, "source_location"),
  (Placeholder::ShortSourceLocation, "short_source_location"),
  (Placeholder::CustomTags, "custom_tags"),
  (Placeholder::StructuredKeys, "structured_keys"),
];

enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

/// A parsed `%(...)`-placeholder pattern plus the [`TimestampFormatter`]
/// backing its `%(time)` placeholder, if present.
pub struct PatternFormatter {
  segments: Vec<Segment>,
  time: Option<TimestampFormatter>,
  rendered: String,
}

impl PatternFormatter {
  /// `pattern` is the `%(...)` template; `timestamp_pattern`/`timezone`
  /// configure the `TimestampFormatter` backing `%(time)` (ignored if the
  /// pattern has no `%(time)` placeholder).
  pub fn new(pattern: &str, timestamp_pattern: &str, timezone: Timezone) -> Result<Self, ConfigurationError> {
    let segments = Self::parse(pattern)?;
    let time = if segments.iter().any(|s| matches!(s, Segment::Placeholder(Placeholder::Time))) {
      Some(TimestampFormatter::new(timestamp_pattern, timezone)?)
    } else {
      None
    };
    Ok(Self {
      segments,
      time,
      rendered: String::new(),
    })
  }

  fn parse(pattern: &str) -> Result<Vec<Segment>, ConfigurationError> {
    let mut segments = Vec::new();
    let mut seen = [false; PLACEHOLDERS.len()];
    let mut rest = pattern;
    while let Some(start) = rest.find("%(") {
      if start > 0 {
        segments.push(Segment::Literal(rest[..start].to_string()));
      }
      let after = &rest[start + 2..];
      let end = after.find(')').ok_or_else(|| ConfigurationError::UnknownPlaceholder(after.to_string()))?;
      let name = &after[..end];
      let (idx, kind) = PLACEHOLDERS
        .iter()
        .enumerate()
        .find(|(_, (_, n))| *n == name)
        .map(|(i, (k, _))| (i, *k))
        .ok_or_else(|| ConfigurationError::UnknownPlaceholder(name.to_string()))?;
      if seen[idx] {
        return Err(ConfigurationError::DuplicatePlaceholder(name.to_string()));
      }
      seen[idx] = true;
      segments.push(Segment::Placeholder(kind));
      rest = &after[end + 1..];
    }
    if !rest.is_empty() {
      segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
  }

  /// Renders `ctx` under this pattern, returning the formatted bytes
  /// spec.md §6's `format(...) -> bytes` contract describes.
  pub fn format(&mut self, ctx: &FormatContext<'_>) -> Vec<u8> {
    self.rendered.clear();
    for segment in &self.segments {
      match segment {
        Segment::Literal(lit) => self.rendered.push_str(lit),
        Segment::Placeholder(kind) => Self::render_placeholder(*kind, ctx, self.time.as_mut(), &mut self.rendered),
      }
    }
    self.rendered.clone().into_bytes()
  }

  fn render_placeholder(
    kind: Placeholder,
    ctx: &FormatContext<'_>,
    time: Option<&mut TimestampFormatter>,
    out: &mut String,
  ) {
    match kind {
      Placeholder::Time => {
        if let Some(tf) = time {
          out.push_str(tf.format_timestamp(ctx.ns_since_epoch));
        }
      }
      Placeholder::FileName => out.push_str(ctx.metadata.filename()),
      Placeholder::FullPath => out.push_str(ctx.metadata.file),
      Placeholder::CallerFunction => out.push_str(ctx.metadata.function),
      Placeholder::LogLevel => out.push_str(ctx.metadata.level.as_padded_str().trim_end()),
      Placeholder::LogLevelId => out.push_str(ctx.metadata.level.as_short_str().trim_end()),
      Placeholder::LineNumber => out.push_str(&ctx.metadata.line.to_string()),
      Placeholder::Logger => out.push_str(ctx.logger_name),
      Placeholder::Message => out.push_str(ctx.formatted_message),
      Placeholder::ThreadId => out.push_str(&ctx.thread_id.to_string()),
      Placeholder::ThreadName => out.push_str(ctx.thread_name),
      Placeholder::ProcessId => out.push_str(&ctx.process_id.to_string()),
      Placeholder::SourceLocation => out.push_str(&ctx.metadata.source_location()),
      Placeholder::ShortSourceLocation => out.push_str(&ctx.metadata.short_source_location()),
      Placeholder::CustomTags => push_kv_pairs(out, ctx.custom_tags),
      Placeholder::StructuredKeys => {
        for (i, (k, _)) in ctx.structured_kvs.iter().enumerate() {
          if i > 0 {
            out.push(',');
          }
          out.push_str(k);
        }
      }
    }
  }
}

fn push_kv_pairs(out: &mut String, pairs: &[(Arc<str>, String)]) {
  for (i, (k, v)) in pairs.iter().enumerate() {
    if i > 0 {
      out.push(',');
    }
    out.push_str(k);
    out.push('=');
    out.push_str(v);
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;
  use crate::level::Level;

  static META: MacroMetadata = MacroMetadata::new("src/handler.rs", 10, "do_work", "msg", Level::Info);

  fn ctx<'a>(message: &'a str, kvs: &'a [(Arc<str>, String)]) -> FormatContext<'a> {
    FormatContext {
      ns_since_epoch: 1_587_161_887_000_000_000,
      thread_id: 7,
      thread_name: "worker-0",
      process_id: 42,
      logger_name: "svc",
      metadata: &META,
      structured_kvs: kvs,
      custom_tags: &[],
      formatted_message: message,
    }
  }

  #[test]
  fn renders_literal_and_message_placeholder() {
    let mut pf = PatternFormatter::new("[%(logger)] %(message)", "%H:%M:%S", Timezone::GmtTime).unwrap();
    let out = pf.format(&ctx("hello", &[]));
    assert_eq!(String::from_utf8(out).unwrap(), "[svc] hello");
  }

  #[test]
  fn renders_time_and_source_location() {
    let mut pf = PatternFormatter::new("%(time) %(short_source_location)", "%H:%M:%S", Timezone::GmtTime).unwrap();
    let out = String::from_utf8(pf.format(&ctx("m", &[]))).unwrap();
    assert_eq!(out, "22:18:07 handler.rs:10");
  }

  #[test]
  fn renders_structured_keys_and_custom_tags() {
    let kvs: Vec<(Arc<str>, String)> = vec![(Arc::from("user_id"), "7".into()), (Arc::from("op"), "write".into())];
    let mut pf = PatternFormatter::new("%(structured_keys)", "%H:%M:%S", Timezone::GmtTime).unwrap();
    let out = String::from_utf8(pf.format(&ctx("m", &kvs))).unwrap();
    assert_eq!(out, "user_id,op");
  }

  #[test]
  fn rejects_unknown_placeholder() {
    assert!(PatternFormatter::new("%(bogus)", "%H:%M:%S", Timezone::GmtTime).is_err());
  }

  #[test]
  fn rejects_duplicate_placeholder() {
    assert!(PatternFormatter::new("%(message) %(message)", "%H:%M:%S", Timezone::GmtTime).is_err());
  }
}
