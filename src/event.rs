//! The event sum type flowing through the SPSC queues (spec.md §3 "Event",
//! §9 "two parallel event-taxonomy generations consolidated into one Event
//! sum with an is_backtrace flag").
//!
//! The original library generates two families of polymorphic event
//! objects (ordinary log records and backtrace-only records) from separate
//! class hierarchies. There is exactly one reason to log a record at
//! `Level::Backtrace` instead of routing it straight to a handler: it
//! belongs in the backtrace store until something flushes it. `Event`
//! models that as a single tagged sum rather than two hierarchies.

use crate::level::Level;
use crate::macro_metadata::MacroMetadata;
use smallvec::SmallVec;
use std::sync::{Arc, Condvar, Mutex};

/// Inline-buffer-first storage for a record's structured key/value pairs
/// (spec.md §6 `%(structured_keys)`). Most call sites attach a handful of
/// fields, so four inline slots avoid a heap allocation on the common path
/// — the same discipline the donor applies to its own small, per-event
/// buffers (`src/kv/mod.rs`'s `SmallVec<[u8; 128]>`).
pub type StructuredKvs = SmallVec<[(Arc<str>, String); 4]>;

/// An ordinary (or backtrace-destined) log record. `message` is fully
/// rendered on the producer thread — Quill does not capture raw format
/// arguments for deferred, backend-side formatting (spec.md §1 Non-goals:
/// compile-time format capture and a `{fmt}`-style formatter are out of
/// scope), so the cost of formatting is paid before the event is queued.
#[derive(Debug, Clone)]
pub struct LogEvent {
  pub capture_timestamp: u64,
  pub thread_id: u32,
  pub thread_name: Arc<str>,
  pub logger_name: Arc<str>,
  pub metadata: &'static MacroMetadata,
  pub message: String,
  pub structured_kvs: StructuredKvs,
}

impl LogEvent {
  #[inline]
  pub fn level(&self) -> Level {
    self.metadata.level
  }
}

/// `LOG_BACKTRACE_INIT` equivalent: (re)configure a logger's backtrace ring
/// capacity. Per spec.md §4.2, this also clears any records already
/// buffered for that logger.
#[derive(Debug, Clone)]
pub struct BacktraceConfigureEvent {
  pub logger_name: Arc<str>,
  pub capacity: usize,
}

/// `LOG_BACKTRACE_FLUSH` equivalent: drain a logger's buffered backtrace
/// records through its handlers.
#[derive(Debug, Clone)]
pub struct BacktraceFlushEvent {
  pub logger_name: Arc<str>,
}

/// A synchronization barrier pushed onto every producer queue the backend
/// drains: once the backend has processed this event it notifies the
/// waiting producer, giving `Logger::flush()` (spec.md §6) a
/// "everything queued before this call has been written" guarantee.
#[derive(Debug, Clone)]
pub struct FlushEvent {
  completion: Arc<(Mutex<bool>, Condvar)>,
}

impl FlushEvent {
  pub fn new() -> Self {
    Self {
      completion: Arc::new((Mutex::new(false), Condvar::new())),
    }
  }

  /// Called once by the backend worker after this event is dequeued.
  pub fn notify_complete(&self) {
    let (lock, cvar) = &*self.completion;
    let mut done = lock.lock().expect("flush mutex poisoned");
    *done = true;
    cvar.notify_all();
  }

  /// Blocks the calling (producer) thread until `notify_complete` runs.
  pub fn wait(&self) {
    let (lock, cvar) = &*self.completion;
    let mut done = lock.lock().expect("flush mutex poisoned");
    while !*done {
      done = cvar.wait(done).expect("flush mutex poisoned");
    }
  }
}

impl Default for FlushEvent {
  fn default() -> Self {
    Self::new()
  }
}

/// Everything a producer can push onto its SPSC queue.
#[derive(Debug, Clone)]
pub enum Event {
  Log(LogEvent),
  BacktraceConfigure(BacktraceConfigureEvent),
  BacktraceFlush(BacktraceFlushEvent),
  Flush(FlushEvent),
}

impl Event {
  /// True for log records destined for the backtrace store rather than
  /// straight to the handler chain.
  pub fn is_backtrace(&self) -> bool {
    matches!(self, Event::Log(e) if e.level() == Level::Backtrace)
  }

  pub fn logger_name(&self) -> Option<&str> {
    match self {
      Event::Log(e) => Some(&e.logger_name),
      Event::BacktraceConfigure(e) => Some(&e.logger_name),
      Event::BacktraceFlush(e) => Some(&e.logger_name),
      Event::Flush(_) => None,
    }
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;

  static BACKTRACE_META: MacroMetadata =
    MacroMetadata::new(file!(), 1, "f", "msg", Level::Backtrace);
  static INFO_META: MacroMetadata = MacroMetadata::new(file!(), 2, "f", "msg", Level::Info);

  fn log_event(metadata: &'static MacroMetadata) -> LogEvent {
    LogEvent {
      capture_timestamp: 0,
      thread_id: 1,
      thread_name: Arc::from("main"),
      logger_name: Arc::from("root"),
      metadata,
      message: "hello".into(),
      structured_kvs: StructuredKvs::new(),
    }
  }

  #[test]
  fn backtrace_level_log_is_flagged() {
    let e = Event::Log(log_event(&BACKTRACE_META));
    assert!(e.is_backtrace());
  }

  #[test]
  fn ordinary_level_log_is_not_flagged() {
    let e = Event::Log(log_event(&INFO_META));
    assert!(!e.is_backtrace());
  }

  #[test]
  fn flush_event_wait_unblocks_after_notify() {
    let flush = FlushEvent::new();
    let waiter = flush.clone();
    let handle = std::thread::spawn(move || waiter.wait());
    std::thread::sleep(std::time::Duration::from_millis(10));
    flush.notify_complete();
    handle.join().unwrap();
  }

  #[test]
  fn logger_name_is_none_for_flush() {
    let e = Event::Flush(FlushEvent::new());
    assert!(e.logger_name().is_none());
  }
}
