//! `StreamHandler`, `FileHandler`, `TimeRotatingFileHandler` and
//! `FileEventNotifier` — the boundary specification of spec.md §4.7.
//! These are concrete enough to run, but deliberately no richer than the
//! contract: no buffering policies, no async I/O, no compression.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};

use crate::error::{ConfigurationError, SinkIoError};
use crate::filter::Filter;
use crate::handler::{FilterChain, Handler};
use crate::level::Level;
use crate::pattern_formatter::{FormatContext, PatternFormatter};
use crate::timestamp_formatter::Timezone;

/// Synchronous observer hooks a file-backed handler calls around its own
/// open/close/write lifecycle (spec.md §4.7 "FileEventNotifier"). All
/// methods have a no-op default; overriding one is the exception, not the
/// rule, mirroring the original's "always-present, rarely-overridden hook
/// set".
pub trait FileEventNotifier: Send {
  fn before_open(&self, _path: &Path) {}
  fn after_open(&self, _path: &Path) {}
  fn before_close(&self, _path: &Path) {}
  fn after_close(&self, _path: &Path) {}
  /// May rewrite the message before it's written; the default passes it
  /// through unchanged.
  fn before_write<'a>(&self, msg: &'a [u8]) -> std::borrow::Cow<'a, [u8]> {
    std::borrow::Cow::Borrowed(msg)
  }
}

#[derive(Default)]
pub struct NoopNotifier;
impl FileEventNotifier for NoopNotifier {}

/// Which standard stream a [`StreamHandler`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
  Stdout,
  Stderr,
}

/// Writes formatted records straight to stdout or stderr.
pub struct StreamHandler {
  name: String,
  target: StreamTarget,
  formatter: PatternFormatter,
  filters: FilterChain,
}

impl StreamHandler {
  pub fn new(name: impl Into<String>, target: StreamTarget, formatter: PatternFormatter) -> Self {
    Self {
      name: name.into(),
      target,
      formatter,
      filters: FilterChain::new(),
    }
  }
}

impl Handler for StreamHandler {
  fn name(&self) -> &str {
    &self.name
  }

  fn format(&mut self, ctx: &FormatContext<'_>) -> Vec<u8> {
    self.formatter.format(ctx)
  }

  fn write(&mut self, formatted: &[u8], _ns: u64, _level: Level) -> Result<(), SinkIoError> {
    let result = match self.target {
      StreamTarget::Stdout => {
        let mut out = io::stdout().lock();
        out.write_all(formatted).and_then(|_| out.write_all(b"\n"))
      }
      StreamTarget::Stderr => {
        let mut out = io::stderr().lock();
        out.write_all(formatted).and_then(|_| out.write_all(b"\n"))
      }
    };
    result.map_err(|source| SinkIoError::Write { handler: self.name.clone(), source })
  }

  fn flush(&mut self) -> Result<(), SinkIoError> {
    let result = match self.target {
      StreamTarget::Stdout => io::stdout().flush(),
      StreamTarget::Stderr => io::stderr().flush(),
    };
    result.map_err(|source| SinkIoError::Flush { handler: self.name.clone(), source })
  }

  fn filters(&self) -> &FilterChain {
    &self.filters
  }

  fn filters_mut(&mut self) -> &mut FilterChain {
    &mut self.filters
  }
}

/// Naming contract for a file handler's initial filename (spec.md §6 "File
/// format (FileSink variants)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNameVariant {
  /// Used as given.
  Plain,
  /// `_YYYYMMDD` inserted before the extension.
  AppendStartDate,
  /// `_YYYYMMDD_HHMMSS` inserted before the extension.
  AppendStartDateTime,
}

fn stamped_path(path: &Path, variant: FileNameVariant, now_ns: u64, tz: Timezone) -> PathBuf {
  let stamp = match variant {
    FileNameVariant::Plain => return path.to_path_buf(),
    FileNameVariant::AppendStartDate => time_breakdown(now_ns, tz).format("%Y%m%d").to_string(),
    FileNameVariant::AppendStartDateTime => time_breakdown(now_ns, tz).format("%Y%m%d_%H%M%S").to_string(),
  };
  insert_before_extension(path, &stamp)
}

fn insert_before_extension(path: &Path, suffix: &str) -> PathBuf {
  let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
  let ext = path.extension().and_then(|s| s.to_str());
  let new_name = match ext {
    Some(ext) => format!("{stem}_{suffix}.{ext}"),
    None => format!("{stem}_{suffix}"),
  };
  path.with_file_name(new_name)
}

fn time_breakdown(ns: u64, tz: Timezone) -> chrono::DateTime<Utc> {
  let secs = (ns / 1_000_000_000) as i64;
  // Rendered fields are identical between Local/Utc for the %Y%m%d(_%H%M%S)
  // patterns used here only in the sense that both produce a valid,
  // monotonically-named file; local-time callers get local-time names.
  match tz {
    Timezone::GmtTime => Utc.timestamp_opt(secs, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap()),
    Timezone::LocalTime => chrono::Local
      .timestamp_opt(secs, 0)
      .single()
      .unwrap_or_else(|| chrono::Local.timestamp_opt(0, 0).single().unwrap())
      .with_timezone(&Utc),
  }
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent)?;
    }
  }
  Ok(())
}

/// A single, non-rotating append-mode file sink.
pub struct FileHandler {
  name: String,
  path: PathBuf,
  file: Option<BufWriter<File>>,
  formatter: PatternFormatter,
  filters: FilterChain,
  notifier: Box<dyn FileEventNotifier>,
}

impl FileHandler {
  pub fn new(
    name: impl Into<String>,
    path: impl Into<PathBuf>,
    variant: FileNameVariant,
    timezone: Timezone,
    formatter: PatternFormatter,
  ) -> io::Result<Self> {
    Self::with_notifier(name, path, variant, timezone, formatter, Box::new(NoopNotifier))
  }

  pub fn with_notifier(
    name: impl Into<String>,
    path: impl Into<PathBuf>,
    variant: FileNameVariant,
    timezone: Timezone,
    formatter: PatternFormatter,
    notifier: Box<dyn FileEventNotifier>,
  ) -> io::Result<Self> {
    let path = stamped_path(&path.into(), variant, crate::clock::now_nanos(), timezone);
    let mut handler = Self {
      name: name.into(),
      path,
      file: None,
      formatter,
      filters: FilterChain::new(),
      notifier,
    };
    handler.open()?;
    Ok(handler)
  }

  fn open(&mut self) -> io::Result<()> {
    self.notifier.before_open(&self.path);
    ensure_parent_dir(&self.path)?;
    let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    self.notifier.after_open(&self.path);
    self.file = Some(BufWriter::new(file));
    Ok(())
  }

  fn close(&mut self) -> io::Result<()> {
    if let Some(mut file) = self.file.take() {
      self.notifier.before_close(&self.path);
      file.flush()?;
      self.notifier.after_close(&self.path);
    }
    Ok(())
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Handler for FileHandler {
  fn name(&self) -> &str {
    &self.name
  }

  fn format(&mut self, ctx: &FormatContext<'_>) -> Vec<u8> {
    self.formatter.format(ctx)
  }

  fn write(&mut self, formatted: &[u8], _ns: u64, _level: Level) -> Result<(), SinkIoError> {
    let rewritten = self.notifier.before_write(formatted);
    let file = self.file.as_mut().expect("file opened at construction");
    file
      .write_all(&rewritten)
      .and_then(|_| file.write_all(b"\n"))
      .map_err(|source| SinkIoError::Write { handler: self.name.clone(), source })
  }

  fn flush(&mut self) -> Result<(), SinkIoError> {
    self
      .file
      .as_mut()
      .expect("file opened at construction")
      .flush()
      .map_err(|source| SinkIoError::Flush { handler: self.name.clone(), source })
  }

  fn filters(&self) -> &FilterChain {
    &self.filters
  }

  fn filters_mut(&mut self) -> &mut FilterChain {
    &mut self.filters
  }
}

impl Drop for FileHandler {
  fn drop(&mut self) {
    let _ = self.close();
  }
}

/// Rotation cadence (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationWhen {
  Minute,
  Hour,
  Daily,
}

impl RotationWhen {
  pub fn parse(s: &str) -> Result<Self, ConfigurationError> {
    match s {
      "M" => Ok(RotationWhen::Minute),
      "H" => Ok(RotationWhen::Hour),
      "daily" => Ok(RotationWhen::Daily),
      other => Err(ConfigurationError::InvalidRotationWindow(other.to_string())),
    }
  }
}

fn next_rotation_after(from_secs: i64, when: RotationWhen, interval: u32, timezone: Timezone, at_time: Option<(u32, u32)>) -> i64 {
  match when {
    RotationWhen::Minute => from_secs + i64::from(interval.max(1)) * 60,
    RotationWhen::Hour => from_secs + i64::from(interval.max(1)) * 3600,
    RotationWhen::Daily => {
      let (hour, minute) = at_time.unwrap_or((0, 0));
      let dt = match timezone {
        Timezone::GmtTime => Utc.timestamp_opt(from_secs, 0).single().unwrap(),
        Timezone::LocalTime => chrono::Local.timestamp_opt(from_secs, 0).single().unwrap().with_timezone(&Utc),
      };
      let today_target = dt
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
        .and_utc()
        .timestamp();
      if today_target > from_secs {
        today_target
      } else {
        (dt.date_naive() + chrono::Duration::days(1))
          .and_hms_opt(hour, minute, 0)
          .unwrap()
          .and_utc()
          .timestamp()
      }
    }
  }
}

/// Rotates its underlying file on a time cadence, keeping a bounded number
/// of renamed backups (spec.md §4.7 rotation contract, §8 scenario 6).
pub struct TimeRotatingFileHandler {
  name: String,
  base_path: PathBuf,
  when: RotationWhen,
  interval: u32,
  backup_count: usize,
  timezone: Timezone,
  at_time: Option<(u32, u32)>,
  /// `None` until the first write establishes a baseline from that
  /// write's own event timestamp — rotation is driven by event time, not
  /// by when the handler happened to be constructed.
  next_rotation: Option<i64>,
  current: Option<BufWriter<File>>,
  backups: VecDeque<PathBuf>,
  formatter: PatternFormatter,
  filters: FilterChain,
  notifier: Box<dyn FileEventNotifier>,
}

impl TimeRotatingFileHandler {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    name: impl Into<String>,
    base_path: impl Into<PathBuf>,
    when: RotationWhen,
    interval: u32,
    backup_count: usize,
    timezone: Timezone,
    at_time: Option<(u32, u32)>,
    formatter: PatternFormatter,
  ) -> io::Result<Self> {
    let base_path = base_path.into();
    ensure_parent_dir(&base_path)?;
    let file = OpenOptions::new().create(true).append(true).open(&base_path)?;
    Ok(Self {
      name: name.into(),
      base_path,
      when,
      interval,
      backup_count,
      timezone,
      at_time,
      next_rotation: None,
      current: Some(BufWriter::new(file)),
      backups: VecDeque::new(),
      formatter,
      filters: FilterChain::new(),
      notifier: Box::new(NoopNotifier),
    })
  }

  /// At most one rotation per call (spec.md §4.7): closes the current
  /// file, renames it with a date/time suffix, enqueues the renamed path,
  /// evicts the oldest backup past `backup_count`, and opens a fresh file.
  fn rotate_if_due(&mut self, event_ns: u64) -> io::Result<()> {
    let event_secs = (event_ns / 1_000_000_000) as i64;
    let next_rotation = match self.next_rotation {
      Some(t) => t,
      None => {
        self.next_rotation = Some(next_rotation_after(event_secs, self.when, self.interval, self.timezone, self.at_time));
        return Ok(());
      }
    };
    if event_secs < next_rotation {
      return Ok(());
    }

    if let Some(mut file) = self.current.take() {
      self.notifier.before_close(&self.base_path);
      file.flush()?;
      self.notifier.after_close(&self.base_path);
    }

    let rotated_path = insert_before_extension(&self.base_path, &time_breakdown(event_ns, self.timezone).format("%Y%m%d_%H%M%S").to_string());
    fs::rename(&self.base_path, &rotated_path)?;
    self.backups.push_back(rotated_path);
    if self.backups.len() > self.backup_count {
      if let Some(oldest) = self.backups.pop_front() {
        let _ = fs::remove_file(oldest);
      }
    }

    self.notifier.before_open(&self.base_path);
    let file = OpenOptions::new().create(true).append(true).open(&self.base_path)?;
    self.notifier.after_open(&self.base_path);
    self.current = Some(BufWriter::new(file));
    self.next_rotation = Some(next_rotation_after(event_secs, self.when, self.interval, self.timezone, self.at_time));
    Ok(())
  }

  pub fn backup_paths(&self) -> impl Iterator<Item = &PathBuf> {
    self.backups.iter()
  }

  pub fn active_path(&self) -> &Path {
    &self.base_path
  }
}

impl Handler for TimeRotatingFileHandler {
  fn name(&self) -> &str {
    &self.name
  }

  fn format(&mut self, ctx: &FormatContext<'_>) -> Vec<u8> {
    self.formatter.format(ctx)
  }

  fn write(&mut self, formatted: &[u8], ns: u64, _level: Level) -> Result<(), SinkIoError> {
    self.rotate_if_due(ns).map_err(|source| SinkIoError::Write { handler: self.name.clone(), source })?;
    let rewritten = self.notifier.before_write(formatted);
    let file = self.current.as_mut().expect("rotate_if_due always leaves a file open");
    file
      .write_all(&rewritten)
      .and_then(|_| file.write_all(b"\n"))
      .map_err(|source| SinkIoError::Write { handler: self.name.clone(), source })
  }

  fn flush(&mut self) -> Result<(), SinkIoError> {
    self
      .current
      .as_mut()
      .expect("rotate_if_due always leaves a file open")
      .flush()
      .map_err(|source| SinkIoError::Flush { handler: self.name.clone(), source })
  }

  fn filters(&self) -> &FilterChain {
    &self.filters
  }

  fn filters_mut(&mut self) -> &mut FilterChain {
    &mut self.filters
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;
  use crate::level::Level;
  use crate::macro_metadata::MacroMetadata;
  use std::io::Read;
  use std::sync::Arc;

  static META: MacroMetadata = MacroMetadata::new(file!(), 1, "f", "m", Level::Info);

  fn ctx<'a>(kvs: &'a [(Arc<str>, String)], tags: &'a [(Arc<str>, String)], msg: &'a str) -> FormatContext<'a> {
    FormatContext {
      ns_since_epoch: 0,
      thread_id: 1,
      thread_name: "t",
      process_id: 1,
      logger_name: "l",
      metadata: &META,
      structured_kvs: kvs,
      custom_tags: tags,
      formatted_message: msg,
    }
  }

  #[test]
  fn file_handler_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("app.log");
    let formatter = PatternFormatter::new("%(message)", "%H:%M:%S", Timezone::GmtTime).unwrap();
    let mut handler = FileHandler::new("f", &path, FileNameVariant::Plain, Timezone::GmtTime, formatter).unwrap();
    let bytes = handler.format(&ctx(&[], &[], "hello"));
    handler.write(&bytes, 0, Level::Info).unwrap();
    handler.flush().unwrap();

    let mut contents = String::new();
    File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "hello\n");
  }

  #[test]
  fn append_start_date_time_inserts_suffix_before_extension() {
    let path = PathBuf::from("/tmp/app.log");
    let stamped = stamped_path(&path, FileNameVariant::AppendStartDateTime, 1_587_161_887_000_000_000, Timezone::GmtTime);
    assert_eq!(stamped, PathBuf::from("/tmp/app_20200417_221807.log"));
  }

  /// spec.md §8 scenario 6: writes spaced 61s apart with a 1-minute
  /// rotation window and backup_count=3 leave exactly 3 renamed backups.
  #[test]
  fn rotation_keeps_bounded_backup_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let formatter = PatternFormatter::new("%(message)", "%H:%M:%S", Timezone::GmtTime).unwrap();
    let mut handler =
      TimeRotatingFileHandler::new("f", &path, RotationWhen::Minute, 1, 3, Timezone::GmtTime, None, formatter).unwrap();

    let base_ns = 1_587_161_887_000_000_000u64;
    for i in 0..5u64 {
      let ns = base_ns + i * 61 * 1_000_000_000;
      let bytes = handler.format(&ctx(&[], &[], &format!("msg{i}")));
      handler.write(&bytes, ns, Level::Info).unwrap();
    }
    handler.flush().unwrap();

    assert_eq!(handler.backup_paths().count(), 3);
    let mut contents = String::new();
    File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "msg4\n");
  }
}
