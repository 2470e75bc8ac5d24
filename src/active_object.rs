//! Active objects: a dedicated thread, a bounded mailbox and a table-driven
//! FSM, wired together behind a small capability set (`post`, `start`,
//! `stop`) that the broker and registry only ever see through
//! [`ActiveObjectHandle`].
//!
//! Where the system this is grounded on gives every active object a common
//! base struct with a vtable of function pointers (`start`/`stop`/`post`/
//! `dispatch`/`log`), this splits that in two: [`ActiveObjectHandle`] is
//! the cheap, `Clone`-able, thread-safe capability the rest of the runtime
//! holds (what the vtable's `post` and identity comparisons needed), while
//! [`ActiveObject<T>`] owns the worker thread and the `T: ActiveObjectLogic`
//! value that only that thread ever touches — there is no cross-thread
//! `void*` super pointer to get wrong.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};

use crate::broker::Broker;
use crate::config::{now_ms, MAILBOX_CAPACITY};
use crate::error::QueueError;
use crate::fsm::{Fsm, State};
use crate::message::{heartbeat_signal, Frame};
use crate::queue::BoundedQueue;
use crate::registry::Registry;
use crate::sync_util::ReadyGate;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// The behaviour plugged into an [`ActiveObject`]: which state table to run
/// and, optionally, a custom dispatch path that bypasses the default
/// fall-through-to-FSM behaviour entirely.
pub trait ActiveObjectLogic: Sized + Send + 'static {
  /// Index into `state_table()` the FSM starts in.
  fn initial_state(&self) -> usize;

  /// The (typically `'static`) state table this logic's FSM runs against.
  fn state_table(&self) -> &'static [State<Self>];

  /// Handles one frame. The default forwards to the FSM; a logic type may
  /// override this to bypass table-driven dispatch for some or all
  /// signals while still having access to the FSM if it wants to fall
  /// back to it.
  fn dispatch(&mut self, fsm: &mut Fsm<Self>, frame: &Frame) {
    fsm.handle(self, frame);
  }
}

struct HandleInner {
  id: usize,
  name: Box<str>,
  mailbox: Arc<BoundedQueue<Frame>>,
  last_heartbeat_ms: AtomicU64,
}

/// A cheap, cloneable capability referring to one active object: post a
/// frame into its mailbox, read its name, or check how stale its last
/// heartbeat is. This is what [`crate::broker::Broker`] subscriber lists
/// and [`crate::registry::Registry`] entries actually store.
#[derive(Clone)]
pub struct ActiveObjectHandle(Arc<HandleInner>);

impl ActiveObjectHandle {
  pub fn id(&self) -> usize {
    self.0.id
  }

  pub fn name(&self) -> &str {
    &self.0.name
  }

  /// Posts a frame into this active object's mailbox, blocking if the
  /// mailbox is momentarily full. Fails only once the active object has
  /// been stopped.
  pub fn post(&self, frame: Frame) -> Result<(), QueueError> {
    trace!("post to {}: signal=0x{:08x}", self.0.name, frame.signal.raw());
    self.0.mailbox.push(frame)
  }

  pub fn last_heartbeat_ms(&self) -> u64 {
    self.0.last_heartbeat_ms.load(Ordering::Relaxed)
  }

  fn touch_heartbeat(&self) {
    self.0.last_heartbeat_ms.store(now_ms(), Ordering::Relaxed);
  }
}

impl PartialEq for ActiveObjectHandle {
  fn eq(&self, other: &Self) -> bool {
    self.0.id == other.0.id
  }
}
impl Eq for ActiveObjectHandle {}

impl std::fmt::Debug for ActiveObjectHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActiveObjectHandle")
      .field("id", &self.0.id)
      .field("name", &self.0.name)
      .finish()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
  Constructed,
  Running,
  Stopped,
}

/// Owns the worker thread and logic value for one active object.
///
/// Construct with [`ActiveObject::new`], obtain a handle with
/// [`ActiveObject::handle`] for other active objects (or the broker) to
/// post through, then call [`ActiveObject::start`] to spin up the worker
/// thread. [`ActiveObject::stop`] is the inverse and is safe to call even
/// if the object was never started.
pub struct ActiveObject<T: ActiveObjectLogic> {
  handle: ActiveObjectHandle,
  broker: Arc<Broker>,
  registry: Arc<Registry>,
  logic: Mutex<Option<T>>,
  worker: Mutex<Option<JoinHandle<()>>>,
  state: Mutex<Lifecycle>,
}

impl<T: ActiveObjectLogic> ActiveObject<T> {
  pub fn new(broker: Arc<Broker>, registry: Arc<Registry>, name: &str, logic: T) -> Arc<Self> {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let handle = ActiveObjectHandle(Arc::new(HandleInner {
      id,
      name: name.into(),
      mailbox: Arc::new(BoundedQueue::new(MAILBOX_CAPACITY)),
      last_heartbeat_ms: AtomicU64::new(now_ms()),
    }));
    Arc::new(ActiveObject {
      handle,
      broker,
      registry,
      logic: Mutex::new(Some(logic)),
      worker: Mutex::new(None),
      state: Mutex::new(Lifecycle::Constructed),
    })
  }

  pub fn handle(&self) -> ActiveObjectHandle {
    self.handle.clone()
  }

  pub fn name(&self) -> &str {
    self.handle.name()
  }

  /// Spawns the worker thread, waits for it to finish its own setup
  /// (constructing and initialising the FSM), then registers the active
  /// object and subscribes it to the heartbeat signal. Idempotent: a
  /// second call on an already-started object is a no-op.
  pub fn start(self: &Arc<Self>) {
    let mut state = self.state.lock().unwrap();
    if *state != Lifecycle::Constructed {
      return;
    }

    let mut logic = self.logic.lock().unwrap().take().expect("logic already taken");
    let mailbox = self.handle.0.mailbox.clone();
    let name: Arc<str> = Arc::from(self.handle.name());
    let ready = Arc::new(ReadyGate::new());
    let ready_for_worker = ready.clone();
    let this_handle = self.handle.clone();

    let join = thread::Builder::new()
      .name(format!("ao-{name}"))
      .spawn(move || {
        let initial = logic.initial_state();
        let table = logic.state_table();
        let mut fsm = Fsm::new(table, initial);
        fsm.init(&mut logic);
        debug!("active object {name} started in state {}", fsm.current_state().name);
        ready_for_worker.signal();

        loop {
          match mailbox.pop() {
            Ok(frame) => {
              if frame.signal == heartbeat_signal() {
                this_handle.touch_heartbeat();
              }
              logic.dispatch(&mut fsm, &frame);
            }
            Err(QueueError::Closed) => break,
          }
        }
        debug!("active object {name} stopped");
      })
      .expect("failed to spawn active object worker thread");

    ready.wait();
    *self.worker.lock().unwrap() = Some(join);
    *state = Lifecycle::Running;
    drop(state);

    self.registry.register(self.handle.clone());
    self.broker.subscribe_exact(heartbeat_signal().raw(), self.handle.clone());
  }

  /// Unregisters the active object, closes its mailbox (waking the worker
  /// if it is blocked in `pop`) and joins the worker thread. Idempotent.
  pub fn stop(&self) {
    let mut state = self.state.lock().unwrap();
    if *state != Lifecycle::Running {
      return;
    }
    *state = Lifecycle::Stopped;
    drop(state);

    self.registry.unregister(&self.handle);
    self.handle.0.mailbox.close();
    if let Some(join) = self.worker.lock().unwrap().take() {
      let _ = join.join();
    }
  }

  /// Posts a frame directly into this active object's mailbox.
  pub fn post(&self, frame: Frame) -> Result<(), QueueError> {
    self.handle.post(frame)
  }
}

impl<T: ActiveObjectLogic> Drop for ActiveObject<T> {
  fn drop(&mut self) {
    if *self.state.lock().unwrap() == Lifecycle::Running {
      warn!("active object {} dropped without stop()", self.name());
      self.stop();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::broker::Broker;
  use crate::fsm::Transition;
  use crate::message::{Severity, Signal, SignalType};
  use crate::registry::Registry;
  use crate::sysinfo::SystemState;
  use std::sync::mpsc;
  use std::time::Duration;

  const SIG_PING: u32 = 42;

  struct Echo {
    sink: mpsc::Sender<u32>,
  }

  fn handle_ping(c: &mut Echo, frame: &Frame) {
    c.sink.send(frame.signal.raw()).unwrap();
  }

  static TABLE: [State<Echo>; 1] = [State {
    name: "idle",
    on_entry: None,
    on_exit: None,
    transitions: &[],
    handler: Some(handle_ping),
  }];

  impl ActiveObjectLogic for Echo {
    fn initial_state(&self) -> usize {
      0
    }
    fn state_table(&self) -> &'static [State<Self>] {
      &TABLE
    }
  }

  fn ping_frame() -> Frame {
    Frame::signal_only(Signal::new(Severity::Info, SystemState::Operational, SignalType::Monitoring, SIG_PING))
  }

  #[test]
  fn start_runs_worker_which_dispatches_posted_frames() {
    let broker = Broker::new();
    let registry = Registry::new();
    let (tx, rx) = mpsc::channel();
    let ao = ActiveObject::new(broker, registry, "echo", Echo { sink: tx });
    ao.start();

    ao.post(ping_frame()).unwrap();
    let got = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(got, SIG_PING);

    ao.stop();
  }

  #[test]
  fn stop_is_idempotent_and_joins_worker() {
    let broker = Broker::new();
    let registry = Registry::new();
    let (tx, _rx) = mpsc::channel();
    let ao = ActiveObject::new(broker, registry, "echo2", Echo { sink: tx });
    ao.start();
    ao.stop();
    ao.stop();
  }

  #[test]
  fn start_registers_and_stop_unregisters() {
    let broker = Broker::new();
    let registry = Registry::new();
    let (tx, _rx) = mpsc::channel();
    let ao = ActiveObject::new(broker, registry.clone(), "echo3", Echo { sink: tx });
    ao.start();
    assert_eq!(registry.len(), 1);
    ao.stop();
    assert_eq!(registry.len(), 0);
  }
}
