//! A concurrent runtime for table-driven active objects that communicate
//! over a topic-routed broker, with a periodic timer service and a
//! registry/watchdog pair for liveness monitoring.
//!
//! The pieces, roughly bottom-up:
//!
//! - [`message`] — signal encoding and the [`message::Frame`] carried
//!   through every mailbox and broker queue.
//! - [`queue`] — [`queue::BoundedQueue`], the mutex+condvar ring buffer
//!   every mailbox and ingress queue is built from.
//! - [`fsm`] — [`fsm::Fsm`], a table-driven finite state machine generic
//!   over its owner type.
//! - [`active_object`] — [`active_object::ActiveObject`], pairing a
//!   worker thread and an `fsm::Fsm` behind a [`active_object::ActiveObjectHandle`]
//!   capability the rest of the runtime holds.
//! - [`broker`] — [`broker::Broker`], exact/mask topic routing with two
//!   priority ingress queues.
//! - [`timer`] — [`timer::TimerService`], three drift-free periodic pumps
//!   driving priority-ordered callback lists.
//! - [`registry`] — [`registry::Registry`], the process-wide list of
//!   running active objects.
//! - [`watchdog`] — wires the timer service and registry together into a
//!   heartbeat broadcaster and staleness sweep.
//! - [`sysinfo`] — system/build identification types.
//! - [`error`] — the crate's fallible-operation error enums.
//! - [`config`] — fixed capacities, periods and thresholds.

pub mod active_object;
pub mod broker;
pub mod config;
pub mod error;
pub mod fsm;
pub mod message;
pub mod queue;
pub mod registry;
mod sync_util;
pub mod sysinfo;
pub mod timer;
pub mod watchdog;

pub use active_object::{ActiveObject, ActiveObjectHandle, ActiveObjectLogic};
pub use broker::{Broker, Priority, TopicConfig};
pub use error::{BrokerError, QueueError, TimerError};
pub use fsm::{Fsm, State, Transition};
pub use message::{Frame, Signal, Severity, SignalType};
pub use queue::BoundedQueue;
pub use registry::Registry;
pub use timer::{TimerHandle, TimerId, TimerService};
pub use watchdog::{spawn_watchdog, watchdog_alert_signal, WatchdogLogic};
