//! The `Handler` contract (spec.md §4.6): formatter + sink + filter chain.
//!
//! Filter-chain visibility follows spec.md §9's "double buffering" design
//! note verbatim: the backend thread keeps a private `Vec<Arc<dyn Filter>>`
//! it reads with no synchronization, while other threads register filters
//! into a shared, mutex-guarded list and flip a relaxed "dirty" flag. The
//! backend refreshes its local copy from the shared list only when the
//! flag is set, so the hot path (`apply`, called once per candidate event)
//! never touches the mutex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{ConfigurationError, SinkIoError};
use crate::filter::{Filter, LogLevelFilter};
use crate::level::Level;
use crate::macro_metadata::MacroMetadata;
use crate::pattern_formatter::FormatContext;

/// Filter-chain double buffering shared by every concrete `Handler`.
/// `log_level_filter` is always present (installed at construction, spec.md
/// §4.6 "`set_log_level` ... installing or updating a distinguished
/// `LogLevelFilter`") and is also reachable directly so `get_log_level`
/// never has to search the chain.
pub struct FilterChain {
  local: Vec<Arc<dyn Filter>>,
  shared: Arc<Mutex<Vec<Arc<dyn Filter>>>>,
  dirty: Arc<AtomicBool>,
  log_level_filter: Arc<LogLevelFilter>,
}

impl FilterChain {
  pub fn new() -> Self {
    let log_level_filter = Arc::new(LogLevelFilter::new());
    let initial: Arc<dyn Filter> = log_level_filter.clone();
    Self {
      local: vec![initial.clone()],
      shared: Arc::new(Mutex::new(vec![initial])),
      dirty: Arc::new(AtomicBool::new(false)),
      log_level_filter,
    }
  }

  /// Registers a predicate. Filter names are unique per handler; a
  /// duplicate name is a [`ConfigurationError`].
  pub fn add_filter(&self, filter: Arc<dyn Filter>) -> Result<(), ConfigurationError> {
    let mut shared = self.shared.lock().expect("filter chain poisoned");
    if shared.iter().any(|f| f.name() == filter.name()) {
      return Err(ConfigurationError::DuplicateFilterName(filter.name().to_string()));
    }
    shared.push(filter);
    self.dirty.store(true, Ordering::Relaxed);
    Ok(())
  }

  pub fn set_log_level(&self, level: Level) {
    self.log_level_filter.set_log_level(level);
  }

  pub fn get_log_level(&self) -> Level {
    self.log_level_filter.log_level()
  }

  /// Backend-side: if another thread registered a filter since the last
  /// refresh, rebuild the local vector from the shared one.
  pub fn refresh_if_dirty(&mut self) {
    if self.dirty.swap(false, Ordering::Relaxed) {
      let shared = self.shared.lock().expect("filter chain poisoned");
      self.local = shared.clone();
    }
  }

  /// Runs every locally-cached filter; all must pass.
  pub fn apply(&self, thread_id: u32, ns: u64, metadata: &MacroMetadata, formatted: &[u8]) -> bool {
    let formatted_str = String::from_utf8_lossy(formatted);
    self.local.iter().all(|f| f.filter(thread_id, ns, metadata, &formatted_str))
  }
}

impl Default for FilterChain {
  fn default() -> Self {
    Self::new()
  }
}

/// A single output target: formatter, sink, and filter chain (spec.md §2).
/// Handler sink objects are backend-exclusive (spec.md §5); nothing outside
/// the backend thread ever calls these methods.
pub trait Handler: Send {
  fn name(&self) -> &str;

  /// Formats `ctx` through this handler's own `PatternFormatter`.
  fn format(&mut self, ctx: &FormatContext<'_>) -> Vec<u8>;

  /// Writes already-formatted, already-filtered bytes to the sink.
  fn write(&mut self, formatted: &[u8], ns: u64, level: Level) -> Result<(), SinkIoError>;

  /// Blocks until the sink has persisted everything written so far.
  fn flush(&mut self) -> Result<(), SinkIoError>;

  fn filters(&self) -> &FilterChain;
  fn filters_mut(&mut self) -> &mut FilterChain;

  fn add_filter(&self, filter: Arc<dyn Filter>) -> Result<(), ConfigurationError> {
    self.filters().add_filter(filter)
  }

  fn set_log_level(&self, level: Level) {
    self.filters().set_log_level(level)
  }

  fn get_log_level(&self) -> Level {
    self.filters().get_log_level()
  }
}

/// `format_and_filter_and_write` (spec.md §4.6): format, refresh the local
/// filter view if dirty, apply filters, and write if they all pass. Free
/// function rather than a trait method so it can borrow `handler` in two
/// disjoint ways (`format` then `filters_mut`/`write`) without `self`
/// aliasing headaches in a `dyn Handler`.
pub fn format_and_filter_and_write(handler: &mut dyn Handler, ctx: &FormatContext<'_>) -> Result<(), SinkIoError> {
  let formatted = handler.format(ctx);
  handler.filters_mut().refresh_if_dirty();
  if handler.filters().apply(ctx.thread_id, ctx.ns_since_epoch, ctx.metadata, &formatted) {
    handler.write(&formatted, ctx.ns_since_epoch, ctx.metadata.level)?;
  }
  Ok(())
}
