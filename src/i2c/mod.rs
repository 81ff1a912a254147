//! I2C target emulation.
//!
//! The bridge answers a downstream I2C master through a small virtual
//! register file:
//!
//! | Register | Contents                                   |
//! |----------|--------------------------------------------|
//! | `0x00`   | identity/version marker `[0x01]`           |
//! | `0x01`   | latest readings, serialized on each read   |
//!
//! A write selects a register with its first byte; a following read (or
//! the read half of a write-read) returns that register's contents.
//!
//! The peripheral sits behind the [`BusTarget`] port: TWIS on target,
//! fakes on the host.

pub mod bridge;
pub mod encode;
#[cfg(feature = "embedded")]
pub mod twis;

use core::future::Future;

use heapless::LinearMap;

use crate::config::{IDENTITY_MARKER, REG_IDENTITY, REG_READINGS};
use crate::error::BusError;

/// Maximum number of registers in the map.
pub const MAX_REGISTERS: usize = 4;

/// What a read of a register returns.
#[derive(Clone, Copy)]
pub enum RegisterKind {
    /// A preconfigured byte sequence, verbatim.
    Fixed(&'static [u8]),
    /// The readings cache, serialized on each read.
    Readings,
    /// Nothing readable; reads get the zero-filled default.
    WriteOnly,
}

/// One virtual register.
#[derive(Clone, Copy)]
pub struct Register {
    pub kind: RegisterKind,
    /// Called with the bytes written after the register selector.
    pub on_write: Option<fn(&[u8])>,
}

impl Register {
    pub const fn fixed(data: &'static [u8]) -> Self {
        Self {
            kind: RegisterKind::Fixed(data),
            on_write: None,
        }
    }

    pub const fn readings() -> Self {
        Self {
            kind: RegisterKind::Readings,
            on_write: None,
        }
    }

    pub const fn write_only(handler: fn(&[u8])) -> Self {
        Self {
            kind: RegisterKind::WriteOnly,
            on_write: Some(handler),
        }
    }
}

/// Register address → register.
pub type RegisterMap = LinearMap<u8, Register, MAX_REGISTERS>;

/// The bridge's standard register map.
pub fn default_registers() -> RegisterMap {
    let mut map = RegisterMap::new();
    // Capacity covers both entries.
    let _ = map.insert(REG_IDENTITY, Register::fixed(IDENTITY_MARKER));
    let _ = map.insert(REG_READINGS, Register::readings());
    map
}

/// A transaction addressed to us, as reported by the bus peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusEvent {
    /// Master wrote `n` bytes, then stopped.
    Write(usize),
    /// Master wrote `n` bytes, then issued a repeated-start read.
    WriteRead(usize),
    /// Master started a read with no preceding write.
    Read,
}

/// I2C peripheral in target (slave) mode.
pub trait BusTarget {
    /// Wait for the next transaction; written bytes land in `rx`.
    fn listen(&mut self, rx: &mut [u8]) -> impl Future<Output = Result<BusEvent, BusError>>;

    /// Answer the pending read with `data`.
    fn respond(&mut self, data: &[u8]) -> impl Future<Output = Result<(), BusError>>;
}
