//! A bounded, thread-safe FIFO queue: the mailbox for active objects and the
//! two ingress queues for the broker.
//!
//! Built from a mutex-guarded ring buffer plus a pair of condition
//! variables (`not_empty`/`not_full`), the same discipline the active
//! object and broker queues in the system this crate is grounded on use —
//! one semaphore pair per queue, reimplemented here as a single mutex
//! shared by two condvars since Rust's `Condvar` already requires a
//! `Mutex` guard.
//!
//! Closing a queue wakes every blocked producer and consumer immediately;
//! this is the mechanism active object shutdown uses to unblock a worker
//! thread parked in `pop` without needing thread cancellation.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::QueueError;

struct Inner<T> {
  buf: VecDeque<T>,
  closed: bool,
}

pub struct BoundedQueue<T> {
  capacity: usize,
  inner: Mutex<Inner<T>>,
  not_empty: Condvar,
  not_full: Condvar,
}

impl<T> BoundedQueue<T> {
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0, "bounded queue capacity must be nonzero");
    BoundedQueue {
      capacity,
      inner: Mutex::new(Inner {
        buf: VecDeque::with_capacity(capacity),
        closed: false,
      }),
      not_empty: Condvar::new(),
      not_full: Condvar::new(),
    }
  }

  /// Pushes `value`, blocking while the queue is full. Returns
  /// [`QueueError::Closed`] if the queue is, or becomes, closed before a
  /// slot is available.
  pub fn push(&self, value: T) -> Result<(), QueueError> {
    let mut inner = self.inner.lock().unwrap();
    loop {
      if inner.closed {
        return Err(QueueError::Closed);
      }
      if inner.buf.len() < self.capacity {
        inner.buf.push_back(value);
        self.not_empty.notify_one();
        return Ok(());
      }
      inner = self.not_full.wait(inner).unwrap();
    }
  }

  /// Pops the oldest value, blocking while the queue is empty. Returns
  /// [`QueueError::Closed`] once the queue has been drained and closed.
  pub fn pop(&self) -> Result<T, QueueError> {
    let mut inner = self.inner.lock().unwrap();
    loop {
      if let Some(value) = inner.buf.pop_front() {
        self.not_full.notify_one();
        return Ok(value);
      }
      if inner.closed {
        return Err(QueueError::Closed);
      }
      inner = self.not_empty.wait(inner).unwrap();
    }
  }

  /// Marks the queue closed, drains any buffered items, and wakes every
  /// thread blocked in `push` or `pop`. Idempotent.
  pub fn close(&self) {
    let mut inner = self.inner.lock().unwrap();
    inner.closed = true;
    inner.buf.clear();
    self.not_empty.notify_all();
    self.not_full.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.inner.lock().unwrap().closed
  }

  pub fn len(&self) -> usize {
    self.inner.lock().unwrap().buf.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
