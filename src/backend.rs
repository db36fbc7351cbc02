//! The Backend Worker (spec.md §4.5): the single thread that drains every
//! producer queue, dispatches on event kind, and owns every backend-
//! exclusive resource (handler table, backtrace store, logger registry
//! reference). Grounded on the donor's `trace::Trace::writer_loop`
//! (`ttlog/src/trace/mod.rs`) — a `Receiver`-drain loop with a periodic
//! idle sleep — generalized from one `crossbeam_channel::Receiver` to N
//! per-thread [`QueueHandle`]s plus a control channel for (de)registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::backtrace_store::BacktraceStore;
use crate::clock::TimestampResolver;
use crate::event::{BacktraceFlushEvent, Event, FlushEvent, LogEvent};
use crate::handler::{format_and_filter_and_write, Handler};
use crate::level::Level;
use crate::logger::LoggerRegistry;
use crate::pattern_formatter::FormatContext;
use crate::spsc_queue::QueueHandle;

/// Control-plane messages sent to the backend thread from anywhere else in
/// the process. Distinct from `Event`, which flows per-producer-thread
/// through SPSC queues; these flow through a single shared
/// `crossbeam_channel` (the donor dependency already used for
/// `trace::Trace`'s `Sender<Message>`).
pub enum BackendMessage {
  RegisterQueue(QueueHandle),
  DeregisterQueue { thread_id: u32, thread_name: Arc<str> },
  RegisterHandler(Arc<str>, Box<dyn Handler>),
}

/// Default pause between poll passes when every queue came up empty.
const DEFAULT_IDLE_SLEEP: Duration = Duration::from_micros(200);

pub struct BackendWorker {
  registry: Arc<LoggerRegistry>,
  resolver: Arc<dyn TimestampResolver>,
  control_rx: Receiver<BackendMessage>,
  handlers: HashMap<Arc<str>, Box<dyn Handler>>,
  backtrace: BacktraceStore,
  queues: Vec<QueueHandle>,
  process_id: u32,
  idle_sleep: Duration,
}

impl BackendWorker {
  pub fn new(registry: Arc<LoggerRegistry>, resolver: Arc<dyn TimestampResolver>, control_rx: Receiver<BackendMessage>) -> Self {
    Self {
      registry,
      resolver,
      control_rx,
      handlers: HashMap::new(),
      backtrace: BacktraceStore::new(),
      queues: Vec::new(),
      process_id: std::process::id(),
      idle_sleep: DEFAULT_IDLE_SLEEP,
    }
  }

  pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
    self.idle_sleep = idle_sleep;
    self
  }

  pub fn with_backtrace_store(mut self, store: BacktraceStore) -> Self {
    self.backtrace = store;
    self
  }

  /// Drains every producer queue to completion, dispatching each event as
  /// it comes off, until `shutdown` is set and every queue (and the
  /// control channel) is empty (spec.md §5 "Cancellation": "the worker
  /// shutdown is cooperative: it processes every remaining event across
  /// every queue before returning").
  pub fn run(&mut self, shutdown: &AtomicBool) {
    loop {
      while let Ok(msg) = self.control_rx.try_recv() {
        self.handle_control_message(msg);
      }

      let mut did_work = false;
      for i in 0..self.queues.len() {
        while let Some(event) = self.queues[i].pop() {
          did_work = true;
          self.process(event);
        }
      }

      if !did_work {
        let drained = self.queues.iter().all(|q| q.is_empty()) && self.control_rx.is_empty();
        if shutdown.load(Ordering::Acquire) && drained {
          return;
        }
        std::thread::sleep(self.idle_sleep);
      }
    }
  }

  fn handle_control_message(&mut self, msg: BackendMessage) {
    match msg {
      BackendMessage::RegisterQueue(q) => {
        tracing::debug!(thread_id = q.thread_id, thread_name = %q.thread_name, "producer queue registered");
        self.queues.push(q);
      }
      BackendMessage::DeregisterQueue { thread_id, thread_name } => {
        tracing::debug!(thread_id, thread_name = %thread_name, "producer queue deregistered");
        self.queues.retain(|q| q.thread_id != thread_id);
      }
      BackendMessage::RegisterHandler(name, handler) => {
        self.handlers.insert(name, handler);
      }
    }
  }

  fn process(&mut self, event: Event) {
    match event {
      Event::Log(log_event) => self.process_log(log_event),
      Event::BacktraceConfigure(e) => self.backtrace.set_capacity(e.logger_name, e.capacity),
      Event::BacktraceFlush(e) => self.process_backtrace_flush(e),
      Event::Flush(f) => self.process_flush(f),
    }
  }

  fn process_log(&mut self, event: LogEvent) {
    if event.level() == Level::Backtrace {
      self.backtrace.store(&event.logger_name, event);
      return;
    }

    let logger_name = event.logger_name.clone();
    self.write_through_handlers(&event);

    if let Some(logger) = self.registry.get(&logger_name) {
      if logger.should_flush_backtrace(event.level()) {
        self.replay_backtrace(&logger_name);
      }
    }
  }

  fn process_backtrace_flush(&mut self, event: BacktraceFlushEvent) {
    self.replay_backtrace(&event.logger_name);
  }

  fn process_flush(&mut self, event: FlushEvent) {
    for (name, handler) in self.handlers.iter_mut() {
      if let Err(err) = handler.flush() {
        tracing::warn!(handler = name.as_ref(), error = %err, "handler flush failed");
      }
    }
    event.notify_complete();
  }

  /// Replays every buffered backtrace record for `logger_name` through the
  /// normal handler-write pipeline (spec.md §4.5 "BacktraceFlushEvent: ...
  /// replay_cb runs the same handler-write pipeline as a normal event").
  /// Collects clones first since `BacktraceStore::process` needs `&mut
  /// self.backtrace` while writing needs `&mut self.handlers` — both live
  /// on `self`, so the two borrows can't overlap.
  fn replay_backtrace(&mut self, logger_name: &str) {
    let mut records = Vec::new();
    self.backtrace.process(logger_name, |e| records.push(e.clone()));
    for record in &records {
      self.write_through_handlers(record);
    }
  }

  fn write_through_handlers(&mut self, event: &LogEvent) {
    let logger = match self.registry.get(&event.logger_name) {
      Some(logger) => logger,
      None => return,
    };
    let ns_since_epoch = self.resolver.resolve(event.capture_timestamp);
    let ctx = FormatContext {
      ns_since_epoch,
      thread_id: event.thread_id,
      thread_name: &event.thread_name,
      process_id: self.process_id,
      logger_name: &event.logger_name,
      metadata: event.metadata,
      structured_kvs: &event.structured_kvs,
      custom_tags: &[],
      formatted_message: &event.message,
    };
    for handler_name in logger.handler_names() {
      if let Some(handler) = self.handlers.get_mut(handler_name.as_ref()) {
        if let Err(err) = format_and_filter_and_write(handler.as_mut(), &ctx) {
          tracing::warn!(handler = handler_name.as_ref(), error = %err, "handler write failed");
        }
      }
    }
  }
}
