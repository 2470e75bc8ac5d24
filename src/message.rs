//! Signal encoding and the message frame carried through mailboxes and the
//! broker.
//!
//! A [`Signal`] packs severity, system state and signal type into the top
//! ten bits of a `u32`, leaving a 22-bit `id` field free for per-type
//! sub-encodings (database table/row, HTTP file descriptor/object id, and
//! so on). This layout, and the bit widths below, come straight from the
//! `AO_SIGNAL`/`*_MSG_ID` macros this module is grounded on.

use std::sync::Arc;

use crate::config::MAX_PAYLOAD;
use crate::sysinfo::SystemState;

/// Severity class of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Severity {
  Info = 1,
  Warning = 2,
  Error = 3,
}

/// Broad category of a signal, used to route it to the worker that
/// understands its `id` sub-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignalType {
  Monitoring = 1,
  Snmp = 2,
  Http = 3,
  Can = 4,
  Memory = 5,
  Database = 6,
  Gpio = 7,
  Fs = 8,
}

/// A fully packed 32-bit signal: `severity:2 | state:4 | type:4 | id:22`.
///
/// Equality and hashing are on the raw bits, so a `Signal` can be used
/// directly as the topic key in [`crate::broker::Broker`] subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal(pub u32);

impl Signal {
  /// Builds a signal from its four fields. `id` is truncated to 22 bits.
  pub const fn new(severity: Severity, state: SystemState, sig_type: SignalType, id: u32) -> Self {
    Signal((severity as u32) << 30 | (state as u32) << 26 | (sig_type as u32) << 22 | (id & 0x3F_FFFF))
  }

  pub const fn raw(self) -> u32 {
    self.0
  }

  pub fn severity_bits(self) -> u8 {
    ((self.0 >> 30) & 0x3) as u8
  }

  pub fn state_bits(self) -> u8 {
    ((self.0 >> 26) & 0xF) as u8
  }

  pub fn type_bits(self) -> u8 {
    ((self.0 >> 22) & 0xF) as u8
  }

  /// The 22-bit id sub-field, for types that don't further sub-encode it.
  pub fn id(self) -> u32 {
    self.0 & 0x3F_FFFF
  }
}

impl From<Signal> for u32 {
  fn from(s: Signal) -> u32 {
    s.0
  }
}

impl From<u32> for Signal {
  fn from(raw: u32) -> Signal {
    Signal(raw)
  }
}

/// Database action embedded in a database signal's id field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DbAction {
  Publish = 1,
  Read = 2,
  Write = 3,
  Update = 4,
}

/// Packs `action:3 | table:5 | row:8` into a database signal's 22-bit id.
pub const fn db_message_id(action: DbAction, table: u8, row: u8) -> u32 {
  ((action as u32) & 0x7) << 13 | ((table as u32) & 0x1F) << 8 | (row as u32) & 0xFF
}

pub fn db_table_id(signal: Signal) -> u8 {
  ((signal.raw() >> 8) & 0x1F) as u8
}

pub fn db_row_idx(signal: Signal) -> u8 {
  (signal.raw() & 0xFF) as u8
}

/// SNMP action embedded in an SNMP signal's id field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SnmpAction {
  GetRecv = 1,
  GetSent = 2,
  SetVar = 3,
  SendTrap = 4,
}

/// Packs `action:6 | oid:16` into an SNMP signal's 22-bit id.
pub const fn snmp_message_id(action: SnmpAction, oid: u16) -> u32 {
  ((action as u32) & 0x3F) << 16 | oid as u32
}

pub fn snmp_action(signal: Signal) -> u8 {
  ((signal.raw() >> 16) & 0x3F) as u8
}

pub fn snmp_oid(signal: Signal) -> u16 {
  (signal.raw() & 0xFFFF) as u16
}

/// HTTP/WebSocket action embedded in an HTTP signal's id field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HttpAction {
  QueryTx = 1,
  QueryRx = 2,
  Command = 3,
}

/// Packs `action:2 | fd:5 | oid:15` into an HTTP signal's 22-bit id.
pub const fn http_message_id(action: HttpAction, fd: u8, oid: u16) -> u32 {
  ((action as u32) & 0x3) << 20 | ((fd as u32) & 0x1F) << 15 | (oid as u32) & 0x7FFF
}

pub fn http_action(signal: Signal) -> u8 {
  ((signal.raw() >> 20) & 0x3) as u8
}

pub fn http_fd(signal: Signal) -> u8 {
  ((signal.raw() >> 15) & 0x1F) as u8
}

pub fn http_oid(signal: Signal) -> u16 {
  (signal.raw() & 0x7FFF) as u16
}

/// The signal every active object's mailbox-handling worker loop treats
/// specially: receiving it touches the active object's heartbeat timestamp
/// before the frame is handed to its own dispatch logic. See
/// `crate::active_object` and `crate::watchdog`.
pub const fn heartbeat_signal() -> Signal {
  Signal::new(Severity::Info, SystemState::Operational, SignalType::Monitoring, 0)
}

/// A message frame: a signal, an inline payload of up to [`MAX_PAYLOAD`]
/// bytes, and an optional out-of-band payload for data too large to inline.
///
/// The out-of-band payload is reference-counted rather than a raw pointer:
/// cloning a `Frame` (as happens on every broker fan-out) cheaply shares it,
/// and it is freed automatically once the last subscriber drops its copy,
/// with no receiver-side ownership protocol to get wrong.
#[derive(Debug, Clone)]
pub struct Frame {
  pub signal: Signal,
  pub length: u32,
  pub payload: [u8; MAX_PAYLOAD],
  pub out_of_band: Option<Arc<[u8]>>,
}

impl Frame {
  /// Builds a frame whose payload fits entirely inline. `data` longer than
  /// [`MAX_PAYLOAD`] is truncated; `length` records the original size.
  pub fn new(signal: Signal, data: &[u8]) -> Self {
    let mut payload = [0u8; MAX_PAYLOAD];
    let n = data.len().min(MAX_PAYLOAD);
    payload[..n].copy_from_slice(&data[..n]);
    Frame {
      signal,
      length: data.len() as u32,
      payload,
      out_of_band: None,
    }
  }

  /// Builds a frame carrying no payload at all, just a signal.
  pub fn signal_only(signal: Signal) -> Self {
    Frame {
      signal,
      length: 0,
      payload: [0u8; MAX_PAYLOAD],
      out_of_band: None,
    }
  }

  /// Attaches an out-of-band payload, shared by reference rather than
  /// copied into the frame.
  pub fn with_out_of_band(mut self, data: Arc<[u8]>) -> Self {
    self.length = data.len() as u32;
    self.out_of_band = Some(data);
    self
  }

  pub fn inline_payload(&self) -> &[u8] {
    let n = (self.length as usize).min(MAX_PAYLOAD);
    &self.payload[..n]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn signal_round_trips_fields() {
    let sig = Signal::new(Severity::Error, SystemState::Maintenance, SignalType::Can, 0x1234);
    assert_eq!(sig.severity_bits(), Severity::Error as u8);
    assert_eq!(sig.state_bits(), SystemState::Maintenance as u8);
    assert_eq!(sig.type_bits(), SignalType::Can as u8);
    assert_eq!(sig.id(), 0x1234);
  }

  #[test]
  fn id_field_is_truncated_to_22_bits() {
    let sig = Signal::new(Severity::Info, SystemState::Init, SignalType::Memory, 0xFFFF_FFFF);
    assert_eq!(sig.id(), 0x3F_FFFF);
  }

  #[test]
  fn db_message_id_packs_and_unpacks() {
    let id = db_message_id(DbAction::Update, 0x1A, 0x7F);
    let sig = Signal::new(Severity::Info, SystemState::Operational, SignalType::Database, id);
    assert_eq!(db_table_id(sig), 0x1A);
    assert_eq!(db_row_idx(sig), 0x7F);
  }

  #[test]
  fn http_message_id_packs_and_unpacks() {
    let id = http_message_id(HttpAction::QueryRx, 0x1F, 0x7FFF);
    let sig = Signal::new(Severity::Info, SystemState::Operational, SignalType::Http, id);
    assert_eq!(http_action(sig), HttpAction::QueryRx as u8);
    assert_eq!(http_fd(sig), 0x1F);
    assert_eq!(http_oid(sig), 0x7FFF);
  }

  #[test]
  fn frame_truncates_oversized_inline_payload() {
    let data = vec![7u8; MAX_PAYLOAD + 16];
    let frame = Frame::new(heartbeat_signal(), &data);
    assert_eq!(frame.length as usize, MAX_PAYLOAD + 16);
    assert_eq!(frame.inline_payload().len(), MAX_PAYLOAD);
  }

  #[test]
  fn out_of_band_payload_is_shared_not_copied() {
    let data: Arc<[u8]> = Arc::from(vec![1, 2, 3]);
    let frame = Frame::signal_only(heartbeat_signal()).with_out_of_band(data.clone());
    assert_eq!(Arc::strong_count(&data), 2);
    drop(frame);
    assert_eq!(Arc::strong_count(&data), 1);
  }
}
