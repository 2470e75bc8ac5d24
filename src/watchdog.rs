//! The watchdog: a 10ms timer callback that publishes a coalesced
//! heartbeat and a 100ms timer callback that sweeps the registry for
//! active objects whose heartbeat has gone stale.
//!
//! Grounded on `ao_watchdog.c`: a tick counter on the 10ms pump that only
//! publishes once every [`crate::config::HEARTBEAT_COALESCE_TICKS`] calls
//! (so at most one heartbeat per ~100ms window), and a 100ms sweep that
//! compares every registered active object's last heartbeat timestamp
//! against [`crate::config::HEARTBEAT_THRESHOLD_MS`] and raises an
//! error-severity alert for anything stale.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::warn;

use crate::active_object::{ActiveObject, ActiveObjectLogic};
use crate::broker::{Broker, Priority};
use crate::config::{now_ms, HEARTBEAT_COALESCE_TICKS, HEARTBEAT_THRESHOLD_MS};
use crate::fsm::State;
use crate::message::{heartbeat_signal, Frame, Severity, Signal, SignalType};
use crate::registry::Registry;
use crate::sysinfo::SystemState;
use crate::timer::{TimerId, TimerService};

/// Signal raised when the staleness sweep finds an active object whose
/// heartbeat has not updated within [`HEARTBEAT_THRESHOLD_MS`].
pub const fn watchdog_alert_signal() -> Signal {
  Signal::new(Severity::Error, SystemState::Error, SignalType::Monitoring, 1)
}

/// The watchdog's own logic: a single idle state with no transitions. All
/// of the watchdog's real work happens in the two timer callbacks it
/// registers at construction, not in its mailbox dispatch path — the
/// mailbox exists only so the watchdog is itself a normal active object
/// the registry and broker can see.
pub struct WatchdogLogic;

static TABLE: [State<WatchdogLogic>; 1] = [State {
  name: "idle",
  on_entry: None,
  on_exit: None,
  transitions: &[],
  handler: None,
}];

impl ActiveObjectLogic for WatchdogLogic {
  fn initial_state(&self) -> usize {
    0
  }
  fn state_table(&self) -> &'static [State<Self>] {
    &TABLE
  }
}

/// Constructs, starts and arms the watchdog's timer callbacks. The
/// returned `ActiveObject` owns the watchdog's own worker thread; the two
/// timer callbacks run on the timer service's pump threads and hold their
/// own references to `broker`/`registry`.
pub fn spawn_watchdog(broker: Arc<Broker>, registry: Arc<Registry>, timers: Arc<TimerService>, name: &str) -> Arc<ActiveObject<WatchdogLogic>> {
  let ao = ActiveObject::new(broker.clone(), registry.clone(), name, WatchdogLogic);
  ao.start();

  let tick = AtomicU8::new(0);
  let heartbeat_broker = broker.clone();
  let heartbeat_handle = timers
    .add_callback(TimerId::Period10, 1, false, move || {
      let count = tick.fetch_add(1, Ordering::SeqCst) + 1;
      if count > HEARTBEAT_COALESCE_TICKS {
        heartbeat_broker.post(Frame::signal_only(heartbeat_signal()), Priority::Secondary);
        tick.store(0, Ordering::SeqCst);
      }
    })
    .expect("watchdog heartbeat callback registration should not exceed capacity");
  timers.arm(heartbeat_handle);

  let monitor_broker = broker;
  let monitor_registry = registry;
  let monitor_handle = timers
    .add_callback(TimerId::Period100, 1, false, move || {
      let now = now_ms();
      for ao in monitor_registry.snapshot() {
        let age = now.saturating_sub(ao.last_heartbeat_ms());
        if age > HEARTBEAT_THRESHOLD_MS {
          warn!("active object {} heartbeat stale by {}ms", ao.name(), age);
          monitor_broker.post(Frame::signal_only(watchdog_alert_signal()), Priority::Primary);
        }
      }
    })
    .expect("watchdog monitor callback registration should not exceed capacity");
  timers.arm(monitor_handle);

  ao
}
