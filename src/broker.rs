//! Topic-routed publish/subscribe broker.
//!
//! Subscriptions are either exact-match (the topic key equals the
//! published signal) or mask-match (the topic key, already canonicalized
//! to `topic & mask`, equals `signal & mask`). Two priority classes —
//! primary and secondary — each have their own bounded ingress queue and
//! their own dedicated pump thread; a primary-class frame is never stuck
//! behind a backlog of secondary-class ones.
//!
//! Grounded on the broker in the system this crate's design is based on:
//! two pump threads draining two ingress queues into a shared topic table,
//! fanning out to subscribers under a single mutex.

use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, trace, warn};

use crate::active_object::ActiveObjectHandle;
use crate::config::{BROKER_INGRESS_CAPACITY, MAX_SUBSCRIBERS_PER_TOPIC, MAX_TOPICS};
use crate::error::BrokerError;
use crate::message::Frame;
use crate::queue::BoundedQueue;
use crate::sync_util::ReadyGate;

/// Which ingress queue a published frame goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
  Primary,
  Secondary,
}

/// How a topic entry's key is compared against a published signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
  Exact,
  Mask,
}

/// A subscription request: either `Signal::new(...).raw()` for an exact
/// match, or a `(topic, mask)` pair for a mask match — the topic is
/// canonicalized to `topic & mask` once, at subscribe time, so every later
/// comparison against an incoming signal uses the same canonical value on
/// both sides.
#[derive(Debug, Clone, Copy)]
pub enum TopicConfig {
  Exact { topic: u32 },
  Mask { topic: u32, mask: u32 },
}

struct TopicEntry {
  kind: MatchKind,
  topic: u32,
  mask: u32,
  subscribers: Vec<(ActiveObjectHandle, bool)>,
  valid: bool,
}

impl TopicEntry {
  fn empty() -> Self {
    TopicEntry {
      kind: MatchKind::Exact,
      topic: 0,
      mask: 0,
      subscribers: Vec::new(),
      valid: false,
    }
  }

  fn matches(&self, kind: MatchKind, topic: u32, mask: u32) -> bool {
    self.valid && self.kind == kind && self.topic == topic && self.mask == mask
  }

  fn matches_signal(&self, signal: u32) -> bool {
    match self.kind {
      MatchKind::Exact => self.topic == signal,
      MatchKind::Mask => self.mask != 0 && self.topic == (signal & self.mask),
    }
  }
}

/// The publish/subscribe broker.
pub struct Broker {
  topics: Mutex<Vec<TopicEntry>>,
  primary: Arc<BoundedQueue<Frame>>,
  secondary: Arc<BoundedQueue<Frame>>,
  pumps: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Broker {
  /// Creates the broker and spawns its two ingress pump threads,
  /// blocking until both have signalled ready.
  pub fn new() -> Arc<Self> {
    let mut topics = Vec::with_capacity(MAX_TOPICS);
    topics.resize_with(MAX_TOPICS, TopicEntry::empty);

    let broker = Arc::new(Broker {
      topics: Mutex::new(topics),
      primary: Arc::new(BoundedQueue::new(BROKER_INGRESS_CAPACITY)),
      secondary: Arc::new(BoundedQueue::new(BROKER_INGRESS_CAPACITY)),
      pumps: Mutex::new(Vec::new()),
    });

    let primary_ready = Arc::new(ReadyGate::new());
    let secondary_ready = Arc::new(ReadyGate::new());

    let mut pumps = Vec::new();
    pumps.push(spawn_pump("broker-primary", broker.clone(), broker.primary.clone(), primary_ready.clone()));
    pumps.push(spawn_pump("broker-secondary", broker.clone(), broker.secondary.clone(), secondary_ready.clone()));
    primary_ready.wait();
    secondary_ready.wait();
    *broker.pumps.lock().unwrap() = pumps;

    broker
  }

  /// Registers `subscriber` for every config in `configs`, creating a new
  /// topic entry (mask configs canonicalized to `topic & mask`) when no
  /// existing entry already matches. Returns the number of configs for
  /// which the subscriber was successfully added.
  ///
  /// Idempotent: calling this twice with the same config and subscriber
  /// reactivates the existing entry rather than duplicating it, and a
  /// topic's active-subscriber count (not its total slot count) is what
  /// is checked against capacity, so a slot freed by `unsubscribe` can be
  /// reused by a later `subscribe`.
  pub fn subscribe(&self, configs: &[TopicConfig], subscriber: ActiveObjectHandle) -> Result<usize, BrokerError> {
    let mut topics = self.topics.lock().unwrap();
    let mut added = 0;
    for config in configs {
      let (kind, topic, mask) = match *config {
        TopicConfig::Exact { topic } => (MatchKind::Exact, topic, 0),
        TopicConfig::Mask { topic, mask } => (MatchKind::Mask, topic & mask, mask),
      };

      let existing = topics.iter().position(|t| t.matches(kind, topic, mask));
      let idx = match existing {
        Some(idx) => idx,
        None => {
          let free = topics.iter().position(|t| !t.valid).ok_or(BrokerError::TopicTableFull)?;
          let entry = &mut topics[free];
          entry.kind = kind;
          entry.topic = topic;
          entry.mask = mask;
          entry.valid = true;
          free
        }
      };

      let entry = &mut topics[idx];
      if let Some((_, active)) = entry.subscribers.iter_mut().find(|(sub, _)| *sub == subscriber) {
        *active = true;
        added += 1;
        continue;
      }

      let active_count = entry.subscribers.iter().filter(|(_, active)| *active).count();
      if active_count >= MAX_SUBSCRIBERS_PER_TOPIC {
        warn!("topic {:#x} subscriber list full, dropping subscription for {}", topic, subscriber.name());
        return Err(BrokerError::SubscriberListFull);
      }

      if let Some(slot) = entry.subscribers.iter_mut().find(|(_, active)| !*active) {
        *slot = (subscriber.clone(), true);
      } else {
        entry.subscribers.push((subscriber.clone(), true));
      }
      added += 1;
    }
    Ok(added)
  }

  /// Deactivates `subscriber`'s entries for every config in `configs`.
  /// Returns the number of entries deactivated.
  pub fn unsubscribe(&self, configs: &[TopicConfig], subscriber: &ActiveObjectHandle) -> usize {
    let mut topics = self.topics.lock().unwrap();
    let mut removed = 0;
    for config in configs {
      let (kind, topic, mask) = match *config {
        TopicConfig::Exact { topic } => (MatchKind::Exact, topic, 0),
        TopicConfig::Mask { topic, mask } => (MatchKind::Mask, topic & mask, mask),
      };
      if let Some(entry) = topics.iter_mut().find(|t| t.matches(kind, topic, mask)) {
        for (sub, active) in entry.subscribers.iter_mut() {
          if *active && *sub == *subscriber {
            *active = false;
            removed += 1;
          }
        }
      }
    }
    removed
  }

  /// Convenience for exact-match subscriptions of a single topic, used by
  /// active object startup to subscribe to the heartbeat signal.
  pub fn subscribe_exact(&self, topic: u32, subscriber: ActiveObjectHandle) {
    let _ = self.subscribe(&[TopicConfig::Exact { topic }], subscriber);
  }

  /// Enqueues `frame` on the chosen ingress queue. Blocks if that queue is
  /// momentarily full; never touches the topic table directly (that
  /// happens on the pump thread), so callers are never held up by a slow
  /// subscriber.
  pub fn post(&self, frame: Frame, priority: Priority) {
    let queue = match priority {
      Priority::Primary => &self.primary,
      Priority::Secondary => &self.secondary,
    };
    if queue.push(frame).is_err() {
      warn!("broker ingress queue closed, dropping frame");
    }
  }

  /// Fans `frame` out to every active subscriber of every topic entry it
  /// matches. The topic table is locked only long enough to snapshot the
  /// matching subscriber list; delivery itself (which may block on a
  /// subscriber's mailbox) happens with the lock released, so one slow
  /// subscriber can't stall publication to the rest or to other topics.
  fn publish(&self, frame: &Frame) {
    let matching: Vec<ActiveObjectHandle> = {
      let topics = self.topics.lock().unwrap();
      topics
        .iter()
        .filter(|t| t.matches_signal(frame.signal.raw()))
        .flat_map(|t| t.subscribers.iter().filter(|(_, active)| *active).map(|(h, _)| h.clone()))
        .collect()
    };

    for subscriber in matching {
      if subscriber.post(frame.clone()).is_err() {
        warn!("failed to deliver signal 0x{:08x} to {}: mailbox closed", frame.signal.raw(), subscriber.name());
      }
    }
  }
}

impl Drop for Broker {
  fn drop(&mut self) {
    self.primary.close();
    self.secondary.close();
    for pump in self.pumps.lock().unwrap().drain(..) {
      let _ = pump.join();
    }
  }
}

fn spawn_pump(name: &'static str, broker: Arc<Broker>, queue: Arc<BoundedQueue<Frame>>, ready: Arc<ReadyGate>) -> thread::JoinHandle<()> {
  thread::Builder::new()
    .name(name.into())
    .spawn(move || {
      debug!("{name} pump started");
      ready.signal();
      loop {
        match queue.pop() {
          Ok(frame) => {
            trace!("{name} pump publishing signal 0x{:08x}", frame.signal.raw());
            broker.publish(&frame);
          }
          Err(_) => break,
        }
      }
      debug!("{name} pump stopped");
    })
    .expect("failed to spawn broker pump thread")
}
