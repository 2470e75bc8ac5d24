//! A table-driven finite state machine.
//!
//! States and transitions live in a static table, the way a jump-table FSM
//! in C would; the machine itself only tracks an index into that table.
//! The FSM is generic over its owner type `C` instead of carrying a
//! `void*` back-pointer to it — entry/exit/transition actions and state
//! handlers all take `&mut C` directly, so an owner's own fields (broker
//! handle, active object handle, whatever it needs) are reachable without
//! an unsafe downcast.

use crate::message::Frame;

pub type ActionFn<C> = fn(&mut C);
pub type HandlerFn<C> = fn(&mut C, &Frame);

/// A single edge out of a state: on `signal`, run `action` (if any) and
/// move to `next`.
pub struct Transition<C> {
  pub signal: u32,
  pub next: usize,
  pub action: Option<ActionFn<C>>,
}

/// One row of the state table.
pub struct State<C> {
  pub name: &'static str,
  pub on_entry: Option<ActionFn<C>>,
  pub on_exit: Option<ActionFn<C>>,
  pub transitions: &'static [Transition<C>],
  pub handler: Option<HandlerFn<C>>,
}

/// The machine: a reference to its (typically `'static`) table plus the
/// index of the current state.
pub struct Fsm<C> {
  table: &'static [State<C>],
  current: usize,
}

impl<C> Fsm<C> {
  pub fn new(table: &'static [State<C>], initial: usize) -> Self {
    assert!(initial < table.len(), "initial state index out of range");
    Fsm { table, current: initial }
  }

  /// Runs the initial state's entry action, if any. Call once, before the
  /// first `handle`.
  pub fn init(&mut self, ctx: &mut C) {
    if let Some(entry) = self.table[self.current].on_entry {
      entry(ctx);
    }
  }

  pub fn current_state(&self) -> &'static State<C> {
    &self.table[self.current]
  }

  pub fn current_index(&self) -> usize {
    self.current
  }

  /// Processes one frame: if the current state has a transition on
  /// `frame.signal`, runs exit → action → entry in that order and switches
  /// state. Either way — transitioned or not — the (possibly new) current
  /// state's handler is then invoked with the same frame. This
  /// fall-through call is deliberate: it lets a state both change in
  /// response to a signal and still react to it.
  pub fn handle(&mut self, ctx: &mut C, frame: &Frame) {
    let raw_signal = frame.signal.raw();
    let transition_index = self.table[self.current]
      .transitions
      .iter()
      .position(|t| t.signal == raw_signal);

    if let Some(ti) = transition_index {
      let transition_action = self.table[self.current].transitions[ti].action;
      let next = self.table[self.current].transitions[ti].next;
      assert!(next < self.table.len(), "transition target out of range");

      if let Some(exit) = self.table[self.current].on_exit {
        exit(ctx);
      }
      if let Some(action) = transition_action {
        action(ctx);
      }
      self.current = next;
      if let Some(entry) = self.table[self.current].on_entry {
        entry(ctx);
      }
    }

    if let Some(handler) = self.table[self.current].handler {
      handler(ctx, frame);
    }
  }
}
