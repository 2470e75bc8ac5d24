//! Process-wide registry of running active objects.
//!
//! The watchdog's staleness sweep needs a point-in-time list of every
//! active object currently running; the registry is that list, guarded by
//! a reader/writer lock rather than the single global mutex the system
//! this crate is grounded on leaves implicit, since reads (the watchdog's
//! sweep) vastly outnumber writes (start/stop).

use std::sync::{Arc, RwLock};

use log::debug;

use crate::active_object::ActiveObjectHandle;
use crate::config::MAX_ACTIVE_OBJECTS;

pub struct Registry {
  entries: RwLock<Vec<ActiveObjectHandle>>,
}

impl Registry {
  pub fn new() -> Arc<Self> {
    Arc::new(Registry {
      entries: RwLock::new(Vec::with_capacity(MAX_ACTIVE_OBJECTS)),
    })
  }

  /// Adds `handle` to the registry. Logs and drops the registration if the
  /// registry is already at capacity, rather than growing past the fixed
  /// bound.
  pub fn register(&self, handle: ActiveObjectHandle) {
    let mut entries = self.entries.write().unwrap();
    if entries.len() >= MAX_ACTIVE_OBJECTS {
      debug!("registry full, cannot register {}", handle.name());
      return;
    }
    debug!("registered active object {}", handle.name());
    entries.push(handle);
  }

  /// Removes `handle`'s entry. Since registry order carries no meaning,
  /// removal swaps the last entry into the removed slot rather than
  /// shifting everything after it down by one.
  pub fn unregister(&self, handle: &ActiveObjectHandle) {
    let mut entries = self.entries.write().unwrap();
    if let Some(idx) = entries.iter().position(|h| h == handle) {
      debug!("unregistered active object {}", handle.name());
      entries.swap_remove(idx);
    }
  }

  /// A point-in-time snapshot of every currently registered handle, for
  /// the watchdog's staleness sweep to iterate without holding the
  /// registry lock across its own work.
  pub fn snapshot(&self) -> Vec<ActiveObjectHandle> {
    self.entries.read().unwrap().clone()
  }

  pub fn len(&self) -> usize {
    self.entries.read().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::active_object::{ActiveObject, ActiveObjectLogic};
  use crate::broker::Broker;
  use crate::fsm::State;

  struct Noop;
  static TABLE: [State<Noop>; 1] = [State {
    name: "idle",
    on_entry: None,
    on_exit: None,
    transitions: &[],
    handler: None,
  }];
  impl ActiveObjectLogic for Noop {
    fn initial_state(&self) -> usize {
      0
    }
    fn state_table(&self) -> &'static [State<Self>] {
      &TABLE
    }
  }

  #[test]
  fn register_and_unregister_round_trip() {
    let broker = Broker::new();
    let registry = Registry::new();
    let ao = ActiveObject::new(broker, registry.clone(), "n1", Noop);
    ao.start();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.snapshot()[0].name(), "n1");
    ao.stop();
    assert!(registry.is_empty());
  }

  #[test]
  fn capacity_overflow_is_dropped_not_panicked() {
    let registry = Registry::new();
    let broker = Broker::new();
    let mut aos = Vec::new();
    for i in 0..(MAX_ACTIVE_OBJECTS + 2) {
      let ao = ActiveObject::new(broker.clone(), registry.clone(), &format!("o{i}"), Noop);
      ao.start();
      aos.push(ao);
    }
    assert_eq!(registry.len(), MAX_ACTIVE_OBJECTS);
    for ao in &aos {
      ao.stop();
    }
  }
}
