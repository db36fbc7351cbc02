//! Named logger configuration and registry (spec.md §3 "Logger", §9 "Global
//! logger registry").
//!
//! A `Logger` is deliberately thin: a name, the names of the handlers it
//! writes through, and an atomic backtrace-flush threshold. The handler
//! objects themselves (files, stdout, their sinks) are backend-exclusive
//! (spec.md §5), so a `Logger` only ever references handlers by name — the
//! backend worker resolves those names against its own handler table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::ConfigurationError;
use crate::level::{AtomicLevel, Level};

/// Bound on `Logger::name`'s byte length: "bounded so a Logger fits within
/// one cache line" (spec.md §3). 64 bytes is a cache line on essentially
/// every target; the name is one field among several on `Logger`, so a
/// little headroom below that is kept for the rest.
pub const MAX_LOGGER_NAME_LEN: usize = 48;

/// Named configuration grouping a set of handlers. Shared: `name` and
/// `handler_names` are written once at registration and then immutable;
/// `backtrace_flush_level` is the one field a producer thread may still
/// mutate concurrently with the backend's reads (spec.md §5).
#[derive(Debug)]
pub struct Logger {
  name: Arc<str>,
  handler_names: Vec<Arc<str>>,
  backtrace_flush_level: AtomicLevel,
}

impl Logger {
  fn new(name: Arc<str>, handler_names: Vec<Arc<str>>) -> Self {
    Self {
      name,
      handler_names,
      backtrace_flush_level: AtomicLevel::new(Level::None),
    }
  }

  pub fn name(&self) -> &Arc<str> {
    &self.name
  }

  pub fn handler_names(&self) -> &[Arc<str>] {
    &self.handler_names
  }

  /// `should_log` (spec.md §6): whether a record at `level` is even worth
  /// building. `Level::None` is the one sentinel that silences a logger
  /// outright; everything else reaches the handler chain, where each
  /// handler's own `LogLevelFilter` makes the finer-grained call.
  pub fn should_log(&self, level: Level) -> bool {
    level != Level::None
  }

  /// Runtime dynamic overload of `should_log` (spec.md §6): true if `level`
  /// would pass this logger's backtrace threshold, i.e. trigger a replay
  /// after a write. Handlers apply their own, separate `LogLevelFilter`.
  pub fn should_flush_backtrace(&self, level: Level) -> bool {
    let threshold = self.backtrace_flush_level.load();
    threshold != Level::None && level >= threshold
  }

  pub fn set_backtrace_flush_level(&self, level: Level) {
    self.backtrace_flush_level.store(level);
  }

  pub fn backtrace_flush_level(&self) -> Level {
    self.backtrace_flush_level.load()
  }
}

/// Explicit, process-owned registry of loggers (spec.md §9: "an explicit
/// `LoggingSystem` object owned by the process; macros resolve loggers
/// through it" — `LoggerRegistry` is the lookup table half of that).
pub struct LoggerRegistry {
  loggers: Mutex<HashMap<Arc<str>, Arc<Logger>>>,
}

pub const ROOT_LOGGER_NAME: &str = "root";

impl Default for LoggerRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl LoggerRegistry {
  pub fn new() -> Self {
    let root: Arc<str> = Arc::from(ROOT_LOGGER_NAME);
    let mut loggers = HashMap::new();
    loggers.insert(root.clone(), Arc::new(Logger::new(root, Vec::new())));
    Self {
      loggers: Mutex::new(loggers),
    }
  }

  fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    if name.len() > MAX_LOGGER_NAME_LEN {
      return Err(ConfigurationError::LoggerNameTooLong(name.to_string(), name.len()));
    }
    Ok(())
  }

  /// Registers (or re-registers) a named logger with an explicit handler
  /// list. Re-registering replaces the handler list entirely; any live
  /// `Arc<Logger>` handles already handed out keep pointing at the old
  /// configuration (the registry hands out a fresh `Arc` each time).
  pub fn register(
    &self,
    name: impl Into<Arc<str>>,
    handler_names: Vec<Arc<str>>,
  ) -> Result<Arc<Logger>, ConfigurationError> {
    let name = name.into();
    Self::validate_name(&name)?;
    let logger = Arc::new(Logger::new(name.clone(), handler_names));
    self.loggers.lock().expect("logger registry poisoned").insert(name, logger.clone());
    Ok(logger)
  }

  pub fn get(&self, name: &str) -> Option<Arc<Logger>> {
    self.loggers.lock().expect("logger registry poisoned").get(name).cloned()
  }

  pub fn root(&self) -> Arc<Logger> {
    self.get(ROOT_LOGGER_NAME).expect("root logger always present")
  }

  /// Returns the named logger, creating it (inheriting the root logger's
  /// current handler list) if it doesn't exist yet. This is the lookup
  /// `get_logger(name)` in spec.md §6 performs.
  pub fn get_or_create(&self, name: &str) -> Result<Arc<Logger>, ConfigurationError> {
    if let Some(existing) = self.get(name) {
      return Ok(existing);
    }
    let handlers = self.root().handler_names().to_vec();
    self.register(name, handlers)
  }

  /// Snapshot of every registered logger, used by the backend when an
  /// operation (e.g. draining at shutdown) must touch all of them.
  pub fn all(&self) -> Vec<Arc<Logger>> {
    self.loggers.lock().expect("logger registry poisoned").values().cloned().collect()
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;

  #[test]
  fn root_logger_exists_with_no_handlers() {
    let registry = LoggerRegistry::new();
    let root = registry.root();
    assert_eq!(&**root.name(), "root");
    assert!(root.handler_names().is_empty());
  }

  #[test]
  fn register_then_get_returns_same_configuration() {
    let registry = LoggerRegistry::new();
    registry.register("svc", vec![Arc::from("stdout")]).unwrap();
    let logger = registry.get("svc").unwrap();
    assert_eq!(logger.handler_names(), &[Arc::from("stdout")]);
  }

  #[test]
  fn get_or_create_inherits_root_handlers() {
    let registry = LoggerRegistry::new();
    registry.register(ROOT_LOGGER_NAME, vec![Arc::from("stdout"), Arc::from("file")]).unwrap();
    let created = registry.get_or_create("new.module").unwrap();
    assert_eq!(created.handler_names().len(), 2);
  }

  #[test]
  fn overlong_name_is_rejected() {
    let registry = LoggerRegistry::new();
    let long_name = "x".repeat(MAX_LOGGER_NAME_LEN + 1);
    assert!(registry.register(long_name, Vec::new()).is_err());
  }

  #[test]
  fn should_log_rejects_only_the_none_sentinel() {
    let logger = LoggerRegistry::new().root();
    assert!(logger.should_log(Level::TraceL3));
    assert!(logger.should_log(Level::Critical));
    assert!(!logger.should_log(Level::None));
  }

  #[test]
  fn backtrace_flush_level_defaults_to_none_so_it_never_triggers() {
    let logger = LoggerRegistry::new().root();
    assert!(!logger.should_flush_backtrace(Level::Critical));
    logger.set_backtrace_flush_level(Level::Error);
    assert!(logger.should_flush_backtrace(Level::Critical));
    assert!(!logger.should_flush_backtrace(Level::Warning));
  }
}
