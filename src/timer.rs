//! Periodic timer service: one pump thread per fixed period (10ms, 100ms,
//! 200ms), each driving a priority-ordered list of armed callbacks off a
//! drift-free absolute deadline.
//!
//! Grounded on the timer manager in the system this crate's design is
//! based on: a per-period thread parks while nothing is armed, otherwise
//! sleeps to an absolute deadline (advancing it by exactly one period each
//! iteration, so small scheduling delays don't accumulate), then walks its
//! callback list highest-priority first. Callback storage here is a
//! fixed-capacity arena of stable-address slots rather than a manually
//! linked list of malloc'd nodes, and each callback is reached through a
//! cloneable `Arc<dyn Fn()>` so the pump can run it with the period's lock
//! released, matching the original's unlock-call-relock discipline without
//! unsafe pointer juggling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::config::{MAX_CALLBACKS_PER_TIMER, TIMER_PERIODS_MS};
use crate::error::TimerError;

/// One of the three fixed pump periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
  Period10,
  Period100,
  Period200,
}

impl TimerId {
  fn index(self) -> usize {
    match self {
      TimerId::Period10 => 0,
      TimerId::Period100 => 1,
      TimerId::Period200 => 2,
    }
  }

  fn period(self) -> Duration {
    Duration::from_millis(TIMER_PERIODS_MS[self.index()])
  }
}

/// Opaque reference to a registered callback, used to arm, disarm or
/// remove it later. Stable across other callbacks being added or removed
/// on the same period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
  timer_id: TimerId,
  slot: usize,
}

struct Slot {
  callback: Arc<dyn Fn() + Send + Sync>,
  priority: u8,
  one_shot: bool,
  armed: bool,
}

struct PeriodState {
  slots: Vec<Option<Slot>>,
  /// Indices into `slots`, kept sorted by priority descending; ties break
  /// by insertion order (a stable sort preserves that on every reorder).
  order: Vec<usize>,
  armed_count: usize,
  stop: bool,
}

impl PeriodState {
  fn new() -> Self {
    PeriodState {
      slots: Vec::new(),
      order: Vec::new(),
      armed_count: 0,
      stop: false,
    }
  }

  fn resort(&mut self) {
    let slots = &self.slots;
    self.order.sort_by(|&a, &b| {
      let pa = slots[a].as_ref().map(|s| s.priority).unwrap_or(0);
      let pb = slots[b].as_ref().map(|s| s.priority).unwrap_or(0);
      pb.cmp(&pa)
    });
  }
}

/// The timer service: three independent per-period pumps sharing no state
/// with each other.
pub struct TimerService {
  periods: [Mutex<PeriodState>; 3],
  cvs: [Condvar; 3],
  started: AtomicBool,
  pumps: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl TimerService {
  /// Constructs the service and spawns its three pump threads. Each pump
  /// immediately parks waiting for its first armed callback; nothing runs
  /// until something is armed.
  pub fn new() -> Arc<Self> {
    let service = Arc::new(TimerService {
      periods: [Mutex::new(PeriodState::new()), Mutex::new(PeriodState::new()), Mutex::new(PeriodState::new())],
      cvs: [Condvar::new(), Condvar::new(), Condvar::new()],
      started: AtomicBool::new(false),
      pumps: Mutex::new(Vec::new()),
    });

    if service.started.swap(true, Ordering::SeqCst) {
      return service;
    }

    let mut pumps = Vec::new();
    for &id in &[TimerId::Period10, TimerId::Period100, TimerId::Period200] {
      let svc = service.clone();
      pumps.push(
        thread::Builder::new()
          .name(format!("timer-{}", TIMER_PERIODS_MS[id.index()]))
          .spawn(move || svc.pump(id))
          .expect("failed to spawn timer pump thread"),
      );
    }
    *service.pumps.lock().unwrap() = pumps;
    service
  }

  /// Registers a new callback on `timer_id`, disarmed. `priority` controls
  /// call order among callbacks on the same period (higher runs first);
  /// `one_shot` disarms the callback automatically after its first call.
  pub fn add_callback<F>(&self, timer_id: TimerId, priority: u8, one_shot: bool, callback: F) -> Result<TimerHandle, TimerError>
  where
    F: Fn() + Send + Sync + 'static,
  {
    let idx = timer_id.index();
    let mut state = self.periods[idx].lock().unwrap();

    let slot_index = state.slots.iter().position(|s| s.is_none());
    let slot_index = match slot_index {
      Some(i) => i,
      None => {
        if state.slots.len() >= MAX_CALLBACKS_PER_TIMER {
          return Err(TimerError::CapacityExceeded);
        }
        state.slots.push(None);
        state.slots.len() - 1
      }
    };

    state.slots[slot_index] = Some(Slot {
      callback: Arc::new(callback),
      priority,
      one_shot,
      armed: false,
    });
    state.order.push(slot_index);
    state.resort();

    Ok(TimerHandle { timer_id, slot: slot_index })
  }

  /// Unregisters a callback. Disarms it first if still armed.
  pub fn remove_callback(&self, handle: TimerHandle) {
    let idx = handle.timer_id.index();
    let mut state = self.periods[idx].lock().unwrap();
    if let Some(Some(slot)) = state.slots.get(handle.slot) {
      if slot.armed {
        state.armed_count = state.armed_count.saturating_sub(1);
      }
    }
    state.slots[handle.slot] = None;
    state.order.retain(|&i| i != handle.slot);
  }

  /// Arms a callback so the pump starts calling it, and wakes the pump if
  /// it was parked waiting for the first armed entry.
  pub fn arm(&self, handle: TimerHandle) {
    let idx = handle.timer_id.index();
    let mut state = self.periods[idx].lock().unwrap();
    if let Some(Some(slot)) = state.slots.get_mut(handle.slot) {
      if !slot.armed {
        slot.armed = true;
        state.armed_count += 1;
      }
    }
    drop(state);
    self.cvs[idx].notify_all();
  }

  /// Disarms a callback; the pump stops calling it on its next sweep.
  pub fn disarm(&self, handle: TimerHandle) {
    let idx = handle.timer_id.index();
    let mut state = self.periods[idx].lock().unwrap();
    if let Some(Some(slot)) = state.slots.get_mut(handle.slot) {
      if slot.armed {
        slot.armed = false;
        state.armed_count = state.armed_count.saturating_sub(1);
      }
    }
  }

  fn pump(&self, id: TimerId) {
    let idx = id.index();
    let period = id.period();
    debug!("timer pump {}ms started", period.as_millis());

    let mut next = Instant::now();
    loop {
      {
        let mut state = self.periods[idx].lock().unwrap();
        while state.armed_count == 0 && !state.stop {
          state = self.cvs[idx].wait(state).unwrap();
        }
        if state.stop {
          break;
        }
        next = next.max(Instant::now()) + period;
      }

      loop {
        let now = Instant::now();
        if now >= next {
          break;
        }
        thread::sleep(next - now);
      }

      let due: Vec<Arc<dyn Fn() + Send + Sync>> = {
        let mut state = self.periods[idx].lock().unwrap();
        if state.stop {
          break;
        }
        let armed_slots: Vec<usize> = state
          .order
          .iter()
          .copied()
          .filter(|&i| state.slots[i].as_ref().map(|s| s.armed).unwrap_or(false))
          .collect();

        let mut callbacks = Vec::with_capacity(armed_slots.len());
        for i in armed_slots {
          if let Some(slot) = &state.slots[i] {
            callbacks.push(slot.callback.clone());
          }
        }
        for &i in &state.order.clone() {
          if let Some(slot) = &mut state.slots[i] {
            if slot.armed && slot.one_shot {
              slot.armed = false;
              state.armed_count = state.armed_count.saturating_sub(1);
            }
          }
        }
        callbacks
      };

      for callback in &due {
        trace!("timer pump {}ms invoking callback", period.as_millis());
        callback();
      }

      // catch-up: if we've fallen more than one period behind, skip ahead
      // rather than bursting through every missed tick.
      let now = Instant::now();
      while now >= next + period {
        warn!("timer pump {}ms overran, skipping a tick", period.as_millis());
        next += period;
      }
    }
    debug!("timer pump {}ms stopped", period.as_millis());
  }
}

impl Drop for TimerService {
  fn drop(&mut self) {
    for idx in 0..3 {
      self.periods[idx].lock().unwrap().stop = true;
      self.cvs[idx].notify_all();
    }
    for pump in self.pumps.lock().unwrap().drain(..) {
      let _ = pump.join();
    }
  }
}
