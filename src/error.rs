//! Crate-wide error types, one small enum per fallible subsystem.
//!
//! Per the design notes in `SPEC_FULL.md` §C, these are the only error
//! channels the runtime exposes: subscription and publication results are
//! plain counts/booleans, and nothing unwinds across a worker thread
//! boundary.

use thiserror::Error;

/// Errors returned by [`crate::broker::Broker`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
  /// The topic table already holds `MAX_TOPICS` entries and none of them
  /// match the requested configuration, so no slot is free to create one.
  #[error("topic table is full")]
  TopicTableFull,
  /// A topic entry already holds `MAX_SUBSCRIBERS_PER_TOPIC` subscribers.
  #[error("subscriber list for topic is full")]
  SubscriberListFull,
}

/// Errors returned by [`crate::timer::TimerService`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
  /// A period's callback arena already holds `MAX_CALLBACKS_PER_TIMER`
  /// live entries.
  #[error("timer callback capacity exceeded")]
  CapacityExceeded,
}

/// Errors returned by [`crate::queue::BoundedQueue`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
  /// The queue was closed while the caller was blocked in `push` or `pop`,
  /// or was already closed when the call was made.
  #[error("queue closed")]
  Closed,
}
