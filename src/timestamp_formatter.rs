//! Cached strftime-style timestamp rendering (spec.md §4.3), ported from
//! `examples/original_source/quill/{include,src}/detail/backend/{StringFromTime,TimestampFormatter}.{h,cpp}`.
//!
//! `strftime` is surprisingly expensive to call on every event. The trick
//! the original library uses, and this module keeps, is to split a format
//! string into literal chunks and `%H`/`%M`/`%S`/`%I`/`%k`/`%l`/`%s`
//! chunks, render the whole thing once with a real time-breakdown call,
//! remember the byte offset of each chunk, and on every subsequent call
//! just patch those offsets with arithmetic on the cached second-of-day
//! counter. The cache is invalidated and fully re-rendered once an hour
//! (local time, to ride through DST changes) or at every noon/midnight
//! (UTC, because `%p`/`%I` depend on which half of the day we're in).

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};

use crate::error::ConfigurationError;

/// Which wall-clock the formatter renders against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
  LocalTime,
  GmtTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
  Hour24,
  Minute,
  Second,
  Hour12,
  Hour24Blank,
  Hour12Blank,
  EpochSeconds,
}

impl FieldKind {
  fn token(self) -> &'static str {
    match self {
      FieldKind::Hour24 => "%H",
      FieldKind::Minute => "%M",
      FieldKind::Second => "%S",
      FieldKind::Hour12 => "%I",
      FieldKind::Hour24Blank => "%k",
      FieldKind::Hour12Blank => "%l",
      FieldKind::EpochSeconds => "%s",
    }
  }
}

const FIELD_TOKENS: [FieldKind; 7] = [
  FieldKind::Hour24,
  FieldKind::Minute,
  FieldKind::Second,
  FieldKind::Hour12,
  FieldKind::Hour24Blank,
  FieldKind::Hour12Blank,
  FieldKind::EpochSeconds,
];

enum Part {
  Literal(String),
  Field(FieldKind),
}

/// Splits `fmt` on the earliest occurrence of any recognized field token.
fn split_once(fmt: &str) -> (Option<String>, Option<FieldKind>, String) {
  let earliest = FIELD_TOKENS
    .iter()
    .filter_map(|k| fmt.find(k.token()).map(|idx| (idx, *k)))
    .min_by_key(|(idx, _)| *idx);

  match earliest {
    None => (None, None, String::new()),
    Some((idx, kind)) => {
      let prefix = if idx > 0 { Some(fmt[..idx].to_string()) } else { None };
      let rest = fmt[idx + kind.token().len()..].to_string();
      (prefix, Some(kind), rest)
    }
  }
}

fn render(epoch_secs: i64, fmt: &str, tz: Timezone) -> String {
  if fmt.is_empty() {
    return String::new();
  }
  match tz {
    Timezone::GmtTime => {
      let dt = Utc.timestamp_opt(epoch_secs, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap());
      dt.format(fmt).to_string()
    }
    Timezone::LocalTime => {
      let dt = Local
        .timestamp_opt(epoch_secs, 0)
        .single()
        .unwrap_or_else(|| Local.timestamp_opt(0, 0).single().unwrap());
      dt.format(fmt).to_string()
    }
  }
}

fn truncate_to_hour(dt: DateTime<Local>) -> DateTime<Local> {
  dt.with_minute(0)
    .and_then(|d| d.with_second(0))
    .and_then(|d| d.with_nanosecond(0))
    .unwrap_or(dt)
}

fn nearest_hour_timestamp(epoch_secs: i64) -> i64 {
  let dt = Local.timestamp_opt(epoch_secs, 0).single().unwrap_or_else(|| Local.timestamp_opt(0, 0).single().unwrap());
  truncate_to_hour(dt).timestamp()
}

/// The next UTC noon or midnight strictly after `epoch_secs`.
fn next_noon_or_midnight_timestamp(epoch_secs: i64) -> i64 {
  let dt = Utc.timestamp_opt(epoch_secs, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap());
  let date = dt.date_naive();
  let midnight = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
  let noon = date.and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp();
  let next_midnight = (date + chrono::Duration::days(1)).and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
  [midnight, noon, next_midnight]
    .into_iter()
    .find(|&t| t > epoch_secs)
    .unwrap_or(next_midnight)
}

/// A single strftime-pattern cache: splits a format string into literal
/// and field parts once, then patches field byte offsets in place until
/// the next recalculation boundary.
struct StringFromTime {
  parts: Vec<Part>,
  cached_indexes: Vec<(usize, FieldKind)>,
  pre_formatted: String,
  full_format: String,
  timezone: Timezone,
  next_recalculation: i64,
  cached_timestamp: i64,
  cached_seconds: u32,
}

impl StringFromTime {
  fn new(format: &str, timezone: Timezone) -> Result<Self, ConfigurationError> {
    if format.contains("%X") {
      return Err(ConfigurationError::UnsupportedLocaleSpecifier);
    }
    let expanded = format
      .replace("%r", "%I:%M:%S %p")
      .replace("%R", "%H:%M")
      .replace("%T", "%H:%M:%S");

    let mut parts = Vec::new();
    let mut remaining = expanded.clone();
    loop {
      let (prefix, field, rest) = split_once(&remaining);
      match field {
        None => {
          if !remaining.is_empty() {
            parts.push(Part::Literal(remaining));
          }
          break;
        }
        Some(f) => {
          if let Some(p) = prefix {
            parts.push(Part::Literal(p));
          }
          parts.push(Part::Field(f));
          remaining = rest;
        }
      }
    }

    let now = crate::clock::now_nanos() as i64 / 1_000_000_000;
    let init_timestamp = match timezone {
      Timezone::LocalTime => nearest_hour_timestamp(now),
      Timezone::GmtTime => now,
    };
    let next_recalculation = match timezone {
      Timezone::LocalTime => init_timestamp + 3600,
      Timezone::GmtTime => next_noon_or_midnight_timestamp(init_timestamp),
    };

    let mut this = Self {
      parts,
      cached_indexes: Vec::new(),
      pre_formatted: String::new(),
      full_format: expanded,
      timezone,
      next_recalculation,
      cached_timestamp: 0,
      cached_seconds: 0,
    };
    this.populate(init_timestamp);
    Ok(this)
  }

  fn populate(&mut self, timestamp: i64) {
    self.cached_timestamp = timestamp;
    self.pre_formatted.clear();
    self.cached_indexes.clear();

    let dt = match self.timezone {
      Timezone::LocalTime => Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|d| (d.hour(), d.minute(), d.second())),
      Timezone::GmtTime => Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|d| (d.hour(), d.minute(), d.second())),
    }
    .unwrap_or((0, 0, 0));
    self.cached_seconds = dt.0 * 3600 + dt.1 * 60 + dt.2;

    for part in &self.parts {
      match part {
        Part::Literal(lit) => self.pre_formatted += &render(timestamp, lit, self.timezone),
        Part::Field(kind) => {
          let rendered = render(timestamp, kind.token(), self.timezone);
          let index = self.pre_formatted.len();
          self.pre_formatted += &rendered;
          self.cached_indexes.push((index, *kind));
        }
      }
    }
  }

  fn format(&mut self, timestamp: i64) -> &str {
    if timestamp < self.cached_timestamp {
      self.pre_formatted = render(timestamp, &self.full_format, self.timezone);
      return &self.pre_formatted;
    }

    if timestamp >= self.next_recalculation {
      self.populate(timestamp);
      self.next_recalculation = match self.timezone {
        Timezone::LocalTime => timestamp + 3600,
        Timezone::GmtTime => next_noon_or_midnight_timestamp(timestamp + 1),
      };
    }

    if self.cached_indexes.is_empty() || self.cached_timestamp == timestamp {
      return &self.pre_formatted;
    }

    let diff = (timestamp - self.cached_timestamp) as u32;
    self.cached_timestamp = timestamp;
    self.cached_seconds += diff;

    let mut secs = self.cached_seconds;
    let hours = secs / 3600;
    secs %= 3600;
    let minutes = secs / 60;
    let seconds = secs % 60;

    for &(index, kind) in &self.cached_indexes.clone() {
      let replacement = match kind {
        FieldKind::Hour24 => format!("{:02}", hours % 24),
        FieldKind::Minute => format!("{:02}", minutes),
        FieldKind::Second => format!("{:02}", seconds),
        FieldKind::Hour12 => {
          let h12 = if hours % 24 == 0 { 12 } else if hours % 24 > 12 { hours % 24 - 12 } else { hours % 24 };
          format!("{:02}", h12)
        }
        FieldKind::Hour24Blank => format!("{:>2}", hours % 24),
        FieldKind::Hour12Blank => {
          let h12 = if hours % 24 == 0 { 12 } else if hours % 24 > 12 { hours % 24 - 12 } else { hours % 24 };
          format!("{:>2}", h12)
        }
        FieldKind::EpochSeconds => format!("{:0>10}", timestamp),
      };
      let width = if kind == FieldKind::EpochSeconds { 10 } else { 2 };
      if index + width <= self.pre_formatted.len() {
        self.pre_formatted.replace_range(index..index + width, &replacement);
      }
    }

    &self.pre_formatted
  }
}

/// Quill's additional, mutually-exclusive fractional-second specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FractionalSpecifier {
  None,
  Millis,
  Micros,
  Nanos,
}

/// Formats nanosecond-since-epoch timestamps using a strftime-style
/// pattern extended with `%Qms`/`%Qus`/`%Qns`.
pub struct TimestampFormatter {
  part1: StringFromTime,
  part2: Option<StringFromTime>,
  fractional: FractionalSpecifier,
  formatted: String,
}

impl TimestampFormatter {
  pub fn new(format: &str, timezone: Timezone) -> Result<Self, ConfigurationError> {
    let specifiers = [
      (FractionalSpecifier::Millis, "%Qms"),
      (FractionalSpecifier::Micros, "%Qus"),
      (FractionalSpecifier::Nanos, "%Qns"),
    ];
    let mut found: Option<(FractionalSpecifier, usize)> = None;
    for (spec, token) in specifiers {
      if let Some(idx) = format.find(token) {
        if found.is_some() {
          return Err(ConfigurationError::MultipleFractionalSpecifiers);
        }
        found = Some((spec, idx));
      }
    }

    let (fractional, part1_str, part2_str) = match found {
      None => (FractionalSpecifier::None, format.to_string(), String::new()),
      Some((spec, idx)) => (spec, format[..idx].to_string(), format[idx + 4..].to_string()),
    };

    let part1 = StringFromTime::new(&part1_str, timezone)?;
    let part2 = if part2_str.is_empty() {
      None
    } else {
      Some(StringFromTime::new(&part2_str, timezone)?)
    };

    Ok(Self {
      part1,
      part2,
      fractional,
      formatted: String::new(),
    })
  }

  /// Renders `time_since_epoch` (nanoseconds) using the configured
  /// pattern. Returns a borrowed view reused across calls.
  pub fn format_timestamp(&mut self, time_since_epoch_ns: u64) -> &str {
    let ns = time_since_epoch_ns as i64;
    let secs = ns.div_euclid(1_000_000_000);
    let extracted_ns = (ns - secs * 1_000_000_000) as u32;

    self.formatted.clear();
    self.formatted += self.part1.format(secs);

    match self.fractional {
      FractionalSpecifier::None => {}
      FractionalSpecifier::Millis => {
        let ms = extracted_ns / 1_000_000;
        self.formatted += &format!("{:03}", ms);
      }
      FractionalSpecifier::Micros => {
        let us = extracted_ns / 1_000;
        self.formatted += &format!("{:06}", us);
      }
      FractionalSpecifier::Nanos => {
        self.formatted += &format!("{:09}", extracted_ns);
      }
    }

    if let Some(part2) = &mut self.part2 {
      self.formatted += part2.format(secs);
    }

    &self.formatted
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;

  /// spec.md §8 scenario 3: 1587161887_987_654_321 ns with `%H:%M:%S.%Qms`
  /// under GMT renders "22:18:07.987".
  #[test]
  fn millisecond_specifier_truncates_to_three_digits() {
    let mut tf = TimestampFormatter::new("%H:%M:%S.%Qms", Timezone::GmtTime).unwrap();
    let out = tf.format_timestamp(1_587_161_887_987_654_321);
    assert_eq!(out, "22:18:07.987");
  }

  #[test]
  fn nanosecond_specifier_keeps_all_nine_digits() {
    let mut tf = TimestampFormatter::new("%H:%M:%S.%Qns", Timezone::GmtTime).unwrap();
    let out = tf.format_timestamp(1_587_161_887_987_654_321);
    assert_eq!(out, "22:18:07.987654321");
  }

  /// spec.md §8 scenario 4: a timestamp older than the last one formatted
  /// falls back to a direct, uncached render instead of patching forward.
  #[test]
  fn backwards_timestamp_falls_back_to_direct_render() {
    let mut tf = TimestampFormatter::new("%H:%M:%S", Timezone::GmtTime).unwrap();
    let first = tf.format_timestamp(1_587_161_887_000_000_000).to_string();
    let earlier = tf.format_timestamp(1_587_161_000_000_000_000).to_string();
    assert_ne!(first, earlier);
    assert_eq!(earlier, "22:03:20");
  }

  /// spec.md §8 scenario 5: crossing a recalculation boundary (UTC noon/
  /// midnight here) still produces a correct, freshly recomputed string.
  #[test]
  fn crossing_recalculation_boundary_recomputes_correctly() {
    let mut tf = TimestampFormatter::new("%H:%M:%S", Timezone::GmtTime).unwrap();
    let before_midnight = 1_587_167_999_000_000_000u64; // 23:59:59 UTC
    let after_midnight = 1_587_168_001_000_000_000u64; // 00:00:01 UTC next day
    assert_eq!(tf.format_timestamp(before_midnight), "23:59:59");
    assert_eq!(tf.format_timestamp(after_midnight), "00:00:01");
  }

  #[test]
  fn rejects_locale_specifier() {
    assert!(TimestampFormatter::new("%X", Timezone::GmtTime).is_err());
  }

  #[test]
  fn rejects_multiple_fractional_specifiers() {
    assert!(TimestampFormatter::new("%Qms%Qus", Timezone::GmtTime).is_err());
  }

  #[test]
  fn alias_expansion_matches_expected_component_order() {
    let mut tf = TimestampFormatter::new("%T", Timezone::GmtTime).unwrap();
    assert_eq!(tf.format_timestamp(1_587_161_887_000_000_000), "22:18:07");
  }
}
