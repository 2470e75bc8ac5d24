//! A tiny one-shot readiness gate: one side waits, the other signals once.
//!
//! Used wherever a spawning thread needs to block until a newly spawned
//! worker has finished its own setup — active object startup, broker pump
//! startup — rather than relying on a fixed sleep.

use std::sync::{Condvar, Mutex};

pub(crate) struct ReadyGate {
  ready: Mutex<bool>,
  cv: Condvar,
}

impl ReadyGate {
  pub(crate) fn new() -> Self {
    ReadyGate {
      ready: Mutex::new(false),
      cv: Condvar::new(),
    }
  }

  pub(crate) fn signal(&self) {
    let mut ready = self.ready.lock().unwrap();
    *ready = true;
    self.cv.notify_all();
  }

  pub(crate) fn wait(&self) {
    let mut ready = self.ready.lock().unwrap();
    while !*ready {
      ready = self.cv.wait(ready).unwrap();
    }
  }
}
