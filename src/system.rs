//! `LoggingSystem` (spec.md §9 "Global logger registry" realization): the
//! explicit, process-owned object that ties producer-facing registration,
//! the backend thread, and startup/shutdown together. Generalizes the
//! donor's `trace::Trace::init` (`ttlog/src/trace/mod.rs`, which spawns a
//! single writer thread and installs a `tracing_subscriber::Layer`) past
//! "one global logger" into Quill's richer per-logger/per-handler model —
//! while still only ever spawning exactly one backend thread, and still
//! emitting its own startup diagnostics through `tracing`.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::backend::{BackendMessage, BackendWorker};
use crate::backtrace_store::BacktraceStore;
use crate::clock::{Clock, IdentityResolver, SystemClock, TimestampResolver};
use crate::error::ConfigurationError;
use crate::event::{BacktraceConfigureEvent, BacktraceFlushEvent, Event, FlushEvent, LogEvent, StructuredKvs};
use crate::handler::Handler;
use crate::level::Level;
use crate::logger::{Logger, LoggerRegistry};
use crate::macro_metadata::MacroMetadata;
use crate::spsc_queue::{OverflowPolicy, ProducerQueue};
use crate::utils::current_thread_id_u32;

/// Construction-time knobs for the handful of things spec.md leaves to the
/// embedder (FLA sizing, producer queue sizing/overflow policy, idle poll
/// interval). This is a closed, in-process struct, not a config-file
/// layer — CLI/config parsing is out of core per spec.md §1.
#[derive(Debug, Clone)]
pub struct LoggingSystemConfig {
  /// Bytes the backend's free-list allocator reserves from the OS up
  /// front (spec.md §4.1 `reserve`).
  pub fla_reserve: usize,
  /// Must be a power of two (spec.md §4.1 `set_minimum_allocation`).
  pub fla_minimum_allocation: usize,
  /// Capacity of each per-producer-thread SPSC queue.
  pub queue_capacity: usize,
  pub overflow_policy: OverflowPolicy,
  /// How long the backend sleeps after a pass that drained nothing.
  pub idle_sleep: Duration,
}

impl Default for LoggingSystemConfig {
  fn default() -> Self {
    Self {
      fla_reserve: 64 * 1024,
      fla_minimum_allocation: 4096,
      queue_capacity: 8192,
      overflow_policy: OverflowPolicy::Drop,
      idle_sleep: Duration::from_micros(200),
    }
  }
}

/// One producer thread's lazily-created registration. Dropped when the
/// thread exits, which deregisters its queue from the backend (spec.md §5
/// "deregisters on thread exit (the backend keeps a copy of the thread
/// id/name before deregistration)").
struct ThreadProducer {
  queue: ProducerQueue,
  control_tx: Sender<BackendMessage>,
}

impl Drop for ThreadProducer {
  fn drop(&mut self) {
    let _ = self.control_tx.send(BackendMessage::DeregisterQueue {
      thread_id: self.queue.thread_id,
      thread_name: self.queue.thread_name.clone(),
    });
  }
}

thread_local! {
  static PRODUCER: RefCell<Option<ThreadProducer>> = const { RefCell::new(None) };
}

/// The explicit singleton object macros resolve loggers through (spec.md
/// §9). Created once per process via [`LoggingSystem::start`]; every
/// producer thread lazily registers its own SPSC queue the first time it
/// logs through this instance.
pub struct LoggingSystem {
  registry: Arc<LoggerRegistry>,
  clock: Arc<dyn Clock>,
  control_tx: Sender<BackendMessage>,
  shutdown: Arc<AtomicBool>,
  worker_thread: Mutex<Option<JoinHandle<()>>>,
  queue_capacity: usize,
  overflow_policy: OverflowPolicy,
}

impl LoggingSystem {
  /// Spawns the backend thread and returns the shared handle producers
  /// and configuration code use from then on.
  pub fn start(config: LoggingSystemConfig) -> Result<Arc<Self>, ConfigurationError> {
    Self::start_with_clock(config, Arc::new(SystemClock), Arc::new(IdentityResolver))
  }

  /// As [`LoggingSystem::start`] but with an explicit [`Clock`]/
  /// [`TimestampResolver`] pair, for callers using a [`crate::clock::TickClock`]
  /// and a matching cycle-to-nanosecond resolver instead of the wall clock.
  pub fn start_with_clock(
    config: LoggingSystemConfig,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn TimestampResolver>,
  ) -> Result<Arc<Self>, ConfigurationError> {
    tracing::info!(
      host = %gethostname::gethostname().to_string_lossy(),
      fla_reserve = config.fla_reserve,
      "quill logging system starting"
    );

    let registry = Arc::new(LoggerRegistry::new());
    let backtrace = BacktraceStore::with_fla_tuning(config.fla_reserve, config.fla_minimum_allocation)?;
    let (control_tx, control_rx) = crossbeam_channel::unbounded();
    let shutdown = Arc::new(AtomicBool::new(false));

    let worker_registry = registry.clone();
    let worker_shutdown = shutdown.clone();
    let idle_sleep = config.idle_sleep;
    let worker_thread = std::thread::Builder::new()
      .name("quill-backend".to_string())
      .spawn(move || {
        let mut worker = BackendWorker::new(worker_registry, resolver, control_rx)
          .with_idle_sleep(idle_sleep)
          .with_backtrace_store(backtrace);
        worker.run(&worker_shutdown);
      })
      .expect("failed to spawn quill backend thread");

    Ok(Arc::new(Self {
      registry,
      clock,
      control_tx,
      shutdown,
      worker_thread: Mutex::new(Some(worker_thread)),
      queue_capacity: config.queue_capacity,
      overflow_policy: config.overflow_policy,
    }))
  }

  pub fn registry(&self) -> &Arc<LoggerRegistry> {
    &self.registry
  }

  pub fn get_root_logger(&self) -> Arc<Logger> {
    self.registry.root()
  }

  pub fn get_logger(&self, name: &str) -> Result<Arc<Logger>, ConfigurationError> {
    self.registry.get_or_create(name)
  }

  pub fn register_logger(&self, name: impl Into<Arc<str>>, handler_names: Vec<Arc<str>>) -> Result<Arc<Logger>, ConfigurationError> {
    self.registry.register(name, handler_names)
  }

  /// Installs `handler` on the backend under `name`. Safe to call after
  /// `start`: it's just another control message, processed in order with
  /// everything else already queued.
  pub fn add_handler(&self, name: impl Into<Arc<str>>, handler: Box<dyn Handler>) {
    let _ = self.control_tx.send(BackendMessage::RegisterHandler(name.into(), handler));
  }

  fn with_producer_queue<R>(&self, f: impl FnOnce(&ProducerQueue) -> R) -> R {
    PRODUCER.with(|cell| {
      {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
          let thread_id = current_thread_id_u32();
          let thread_name: Arc<str> = Arc::from(std::thread::current().name().unwrap_or("unnamed"));
          let queue = ProducerQueue::new(thread_id, thread_name, self.queue_capacity, self.overflow_policy);
          let _ = self.control_tx.send(BackendMessage::RegisterQueue(queue.handle()));
          *slot = Some(ThreadProducer {
            queue,
            control_tx: self.control_tx.clone(),
          });
        }
      }
      let borrow = cell.borrow();
      f(&borrow.as_ref().expect("populated above").queue)
    })
  }

  /// Captures `capture_timestamp` on this (producer) thread and enqueues a
  /// `LogEvent` (spec.md §6 `Logger.log(...)`). `message` is already fully
  /// rendered — Quill's macro/format-capture layer is out of core
  /// (spec.md §1), so formatting happens before this call, not inside it.
  pub fn log(&self, logger: &Arc<Logger>, metadata: &'static MacroMetadata, message: String) {
    self.log_with_kvs(logger, metadata, message, StructuredKvs::new());
  }

  /// As [`LoggingSystem::log`], additionally attaching `structured_kvs` —
  /// the key/value pairs a `%(structured_keys)` placeholder renders
  /// (spec.md §6).
  pub fn log_with_kvs(&self, logger: &Arc<Logger>, metadata: &'static MacroMetadata, message: String, structured_kvs: StructuredKvs) {
    if !logger.should_log(metadata.level) {
      return;
    }
    let capture_timestamp = self.clock.capture();
    self.with_producer_queue(|queue| {
      let event = LogEvent {
        capture_timestamp,
        thread_id: queue.thread_id,
        thread_name: queue.thread_name.clone(),
        logger_name: logger.name().clone(),
        metadata,
        message,
        structured_kvs,
      };
      queue.push(Event::Log(event));
    });
  }

  pub fn backtrace_configure(&self, logger: &Arc<Logger>, capacity: u32) {
    self.with_producer_queue(|queue| {
      queue.push(Event::BacktraceConfigure(BacktraceConfigureEvent {
        logger_name: logger.name().clone(),
        capacity: capacity as usize,
      }));
    });
  }

  pub fn backtrace_flush(&self, logger: &Arc<Logger>) {
    self.with_producer_queue(|queue| {
      queue.push(Event::BacktraceFlush(BacktraceFlushEvent {
        logger_name: logger.name().clone(),
      }));
    });
  }

  /// Enqueues a flush barrier on this thread's queue and blocks until the
  /// backend has processed it — which, per ordering guarantees, only
  /// happens after every event this thread enqueued earlier and after
  /// every handler has been flushed (spec.md §8 "Flush totality").
  pub fn flush(&self) {
    let event = FlushEvent::new();
    self.with_producer_queue(|queue| queue.push(Event::Flush(event.clone())));
    event.wait();
  }

  /// Cooperative shutdown: marks the backend for stop, which drains every
  /// remaining queued event before the thread exits, then joins it.
  pub fn stop_and_drain(&self) {
    self.shutdown.store(true, Ordering::Release);
    if let Some(handle) = self.worker_thread.lock().expect("worker thread mutex poisoned").take() {
      let _ = handle.join();
    }
  }
}

impl Drop for LoggingSystem {
  fn drop(&mut self) {
    self.stop_and_drain();
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;
  use crate::handler::FilterChain;
  use crate::pattern_formatter::FormatContext;
  use std::sync::Mutex as StdMutex;

  static META: MacroMetadata = MacroMetadata::new(file!(), 1, "f", "m", Level::Info);

  struct RecordingHandler {
    writes: Arc<StdMutex<Vec<String>>>,
    filters: FilterChain,
  }

  impl Handler for RecordingHandler {
    fn name(&self) -> &str {
      "rec"
    }
    fn format(&mut self, ctx: &FormatContext<'_>) -> Vec<u8> {
      ctx.formatted_message.as_bytes().to_vec()
    }
    fn write(&mut self, formatted: &[u8], _ns: u64, _level: Level) -> Result<(), crate::error::SinkIoError> {
      self.writes.lock().unwrap().push(String::from_utf8_lossy(formatted).to_string());
      Ok(())
    }
    fn flush(&mut self) -> Result<(), crate::error::SinkIoError> {
      Ok(())
    }
    fn filters(&self) -> &FilterChain {
      &self.filters
    }
    fn filters_mut(&mut self) -> &mut FilterChain {
      &mut self.filters
    }
  }

  #[test]
  fn end_to_end_log_reaches_the_handler() {
    let system = LoggingSystem::start(LoggingSystemConfig::default()).unwrap();
    let writes = Arc::new(StdMutex::new(Vec::new()));
    system.add_handler(
      "rec",
      Box::new(RecordingHandler {
        writes: writes.clone(),
        filters: FilterChain::new(),
      }),
    );
    let logger = system.register_logger("svc", vec![Arc::from("rec")]).unwrap();

    system.log(&logger, &META, "hello".to_string());
    system.flush();

    assert_eq!(*writes.lock().unwrap(), vec!["hello".to_string()]);
    system.stop_and_drain();
  }

  #[test]
  fn structured_kvs_reach_the_handler_via_the_pattern() {
    let system = LoggingSystem::start(LoggingSystemConfig::default()).unwrap();
    let writes = Arc::new(StdMutex::new(Vec::new()));
    system.add_handler(
      "rec",
      Box::new(RecordingHandler {
        writes: writes.clone(),
        filters: FilterChain::new(),
      }),
    );
    let logger = system.register_logger("svc", vec![Arc::from("rec")]).unwrap();

    let mut kvs = crate::event::StructuredKvs::new();
    kvs.push((Arc::from("user_id"), "7".to_string()));
    system.log_with_kvs(&logger, &META, "hello".to_string(), kvs);
    system.flush();

    // RecordingHandler::format ignores structured_kvs, so this only proves
    // the event carried them this far without panicking; pattern_formatter's
    // own tests cover rendering `%(structured_keys)` from a FormatContext.
    assert_eq!(*writes.lock().unwrap(), vec!["hello".to_string()]);
    system.stop_and_drain();
  }

  #[test]
  fn flush_returns_even_with_no_handlers_registered() {
    let system = LoggingSystem::start(LoggingSystemConfig::default()).unwrap();
    system.flush();
    system.stop_and_drain();
  }
}
