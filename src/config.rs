//! Fixed, compile-time configuration.
//!
//! Nothing here is loaded at runtime: the mailbox and ingress capacities,
//! table sizes and timer periods are all load-bearing constants baked into
//! the binary, matching the `#define`-based configuration of the system
//! this crate's design is grounded on.

use std::sync::OnceLock;
use std::time::Instant;

/// Capacity of a single active object's mailbox.
pub const MAILBOX_CAPACITY: usize = 16;

/// Capacity of each of the broker's two ingress queues.
pub const BROKER_INGRESS_CAPACITY: usize = 128;

/// Maximum number of distinct topic entries the broker can hold at once.
pub const MAX_TOPICS: usize = 32;

/// Maximum number of subscribers a single topic entry can hold.
pub const MAX_SUBSCRIBERS_PER_TOPIC: usize = 32;

/// Maximum number of active objects the registry can track at once.
pub const MAX_ACTIVE_OBJECTS: usize = 32;

/// Size of a message frame's inline payload, in bytes.
pub const MAX_PAYLOAD: usize = 120;

/// Maximum length of an active object's name, in bytes.
pub const MAX_NAME_LEN: usize = 31;

/// Periods, in milliseconds, the timer service pumps on.
pub const TIMER_PERIODS_MS: [u64; 3] = [10, 100, 200];

/// Maximum number of live callback entries per timer period.
pub const MAX_CALLBACKS_PER_TIMER: usize = 32;

/// Staleness threshold the watchdog applies to an active object's last
/// heartbeat timestamp.
pub const HEARTBEAT_THRESHOLD_MS: u64 = 200;

/// Number of 10ms heartbeat-pump ticks the watchdog coalesces into a single
/// published heartbeat (so at most one heartbeat is published per ~100ms).
pub const HEARTBEAT_COALESCE_TICKS: u8 = 10;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds elapsed since this process' monotonic epoch.
///
/// The epoch is established lazily on first use and is private to the
/// process; the returned value is only meaningful for comparisons within a
/// single run, matching how the heartbeat bookkeeping in
/// [`crate::active_object`] and [`crate::watchdog`] use it.
pub fn now_ms() -> u64 {
  let epoch = EPOCH.get_or_init(Instant::now);
  epoch.elapsed().as_millis() as u64
}
