//! Per-producer-thread SPSC queue (spec.md §4.4 external contract), built
//! on `crossbeam_queue::ArrayQueue` — the donor's own choice for its
//! `LockFreeRingBuffer` (`ttlog/src/lf_buffer/mod.rs`), narrowed here from
//! the donor's MPMC-safe, overwrite-on-full ring down to the
//! single-producer/single-consumer discipline spec.md requires: one queue
//! per registered producer thread, drained only by the backend thread.
//!
//! `ArrayQueue` is already lock-free on both ends, so it satisfies the
//! external contract directly; what this module adds is the
//! bounded-capacity overflow policy (spec.md §5: "the overflow policy
//! decides (drop the event or block until space)") and the thread
//! identity a producer registers alongside its queue.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::Backoff;

use crate::event::Event;

/// What a producer does when its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
  /// Drop the event silently; the producer's hot path never blocks.
  Drop,
  /// Spin (with exponential backoff, falling back to a short sleep) until
  /// the backend has drained space.
  Block,
}

/// One producer thread's registration: its queue plus the identity the
/// backend attaches to events dequeued from it.
pub struct ProducerQueue {
  pub thread_id: u32,
  pub thread_name: Arc<str>,
  queue: Arc<ArrayQueue<Event>>,
  policy: OverflowPolicy,
}

impl ProducerQueue {
  pub fn new(thread_id: u32, thread_name: Arc<str>, capacity: usize, policy: OverflowPolicy) -> Self {
    Self {
      thread_id,
      thread_name,
      queue: Arc::new(ArrayQueue::new(capacity.max(1))),
      policy,
    }
  }

  /// A handle the backend keeps to drain this queue, independent of the
  /// producer-side [`ProducerQueue`] (which may have already been dropped
  /// on thread exit — the queue itself lives on as long as either side
  /// holds the `Arc`).
  pub fn handle(&self) -> QueueHandle {
    QueueHandle {
      thread_id: self.thread_id,
      thread_name: self.thread_name.clone(),
      queue: self.queue.clone(),
    }
  }

  /// Publishes `event`, applying this producer's overflow policy if the
  /// queue is momentarily full.
  pub fn push(&self, mut event: Event) {
    match self.policy {
      OverflowPolicy::Drop => {
        let _ = self.queue.push(event);
      }
      OverflowPolicy::Block => {
        let backoff = Backoff::new();
        loop {
          match self.queue.push(event) {
            Ok(()) => return,
            Err(rejected) => {
              event = rejected;
              if backoff.is_completed() {
                std::thread::sleep(Duration::from_micros(50));
              } else {
                backoff.snooze();
              }
            }
          }
        }
      }
    }
  }
}

/// The backend's side of a registered producer queue: enough to drain it
/// and to stamp dequeued events with where they came from.
#[derive(Clone)]
pub struct QueueHandle {
  pub thread_id: u32,
  pub thread_name: Arc<str>,
  queue: Arc<ArrayQueue<Event>>,
}

impl QueueHandle {
  pub fn pop(&self) -> Option<Event> {
    self.queue.pop()
  }

  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }
}

#[cfg(test)]
mod __test__ {
  use super::*;
  use crate::event::{Event, FlushEvent};

  #[test]
  fn push_then_pop_preserves_fifo_order() {
    let producer = ProducerQueue::new(1, Arc::from("t"), 4, OverflowPolicy::Drop);
    let consumer = producer.handle();
    producer.push(Event::Flush(FlushEvent::new()));
    producer.push(Event::Flush(FlushEvent::new()));
    assert!(consumer.pop().is_some());
    assert!(consumer.pop().is_some());
    assert!(consumer.pop().is_none());
  }

  #[test]
  fn drop_policy_discards_on_overflow_without_blocking() {
    let producer = ProducerQueue::new(1, Arc::from("t"), 1, OverflowPolicy::Drop);
    let consumer = producer.handle();
    producer.push(Event::Flush(FlushEvent::new()));
    producer.push(Event::Flush(FlushEvent::new())); // dropped, queue capacity 1
    assert!(consumer.pop().is_some());
    assert!(consumer.pop().is_none());
  }

  #[test]
  fn block_policy_eventually_delivers_once_space_frees() {
    let producer = Arc::new(ProducerQueue::new(1, Arc::from("t"), 1, OverflowPolicy::Block));
    let consumer = producer.handle();
    producer.push(Event::Flush(FlushEvent::new()));

    let blocked_producer = producer.clone();
    let handle = std::thread::spawn(move || blocked_producer.push(Event::Flush(FlushEvent::new())));
    std::thread::sleep(Duration::from_millis(5));
    assert!(consumer.pop().is_some()); // frees space for the blocked push
    handle.join().unwrap();
    assert!(consumer.pop().is_some());
  }
}
