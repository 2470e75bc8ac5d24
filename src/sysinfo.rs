//! System and build identification types.
//!
//! Carried over from the state/version vocabulary of the original firmware
//! this runtime's design is grounded on (`sys_defns.h`): `SystemState` gives
//! [`crate::message::Signal`] real variants for its state-class field, and
//! `SystemInfo`/`HardwareInfo`/`SoftwareInfo` are the kind of small,
//! plain-data records a watchdog or diagnostics active object would publish
//! or respond to queries with.

/// Coarse operating state of the whole system, mirrored into every
/// [`crate::message::Signal`]'s state-class field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SystemState {
  Init = 1,
  Operational = 2,
  Error = 3,
  Loader = 4,
  Maintenance = 5,
}

/// Snapshot of overall system status, as a diagnostics active object might
/// publish periodically or hand back in response to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
  pub current_state: SystemState,
  pub status: u32,
  pub up_time_ms: u64,
  pub error_code: u32,
}

/// Identification of a piece of hardware the system depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareInfo {
  pub id: u16,
  pub version_major: u8,
  pub version_minor: u8,
  pub crc: u32,
}

/// Identification of a piece of software (firmware image, build) the
/// system is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareInfo {
  pub id: u16,
  pub version_major: u8,
  pub version_minor: u8,
  pub build_day: u8,
  pub build_month: u8,
  pub build_year: u16,
  pub size: u32,
  pub crc: u32,
}
