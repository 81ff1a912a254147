//! Bluetooth Low Energy subsystem.
//!
//! The bridge drives the radio in **Central** role:
//!
//! 1. **Discovery** - scans for sensor nodes advertising the configured
//!    service signature and connects to each unique one.
//! 2. **Profile** - performs GATT service/characteristic discovery on each
//!    connection (identity service + sensor service).
//!
//! The radio itself sits behind the [`Central`] / [`GattLink`] ports so
//! the logic above can run against the SoftDevice on target and against
//! fakes on the host.

pub mod adv_filter;
pub mod discovery;
pub mod profile;
#[cfg(feature = "embedded")]
pub mod softdevice;

use core::fmt;
use core::future::Future;

use heapless::Vec;

use crate::config::MAX_CHARS_PER_SERVICE;
use crate::error::BleError;

/// GATT attribute handle of a characteristic value.
pub type CharHandle = u16;

/// Characteristic value handles resolved for one service.
pub type Handles = Vec<CharHandle, MAX_CHARS_PER_SERVICE>;

/// BLE device address.
///
/// `bytes` are in over-the-air order (least significant byte first), as
/// the SoftDevice reports them.  Displayed most significant byte first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    /// Address type (0 = public, 1 = random static, ...).
    pub kind: u8,
    /// 48-bit address, LSB first.
    pub bytes: [u8; 6],
}

impl DeviceAddress {
    /// Random static address type, used by the sensor node firmware.
    pub const RANDOM_STATIC: u8 = 1;

    pub const fn new(kind: u8, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }

    /// `true` if both addresses name the same 48-bit device, ignoring the
    /// address type byte.
    pub fn same_device(&self, other: &DeviceAddress) -> bool {
        self.bytes == other.bytes
    }

    /// Parse `AA:BB:CC:DD:EE:FF` (most significant byte first).
    pub fn parse(text: &str) -> Option<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = text.trim().split(':');
        for slot in bytes.iter_mut().rev() {
            let part = parts.next()?;
            if part.len() != 2 {
                return None;
            }
            *slot = u8::from_str_radix(part, 16).ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(Self::RANDOM_STATIC, bytes))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeviceAddress {
    fn format(&self, f: defmt::Formatter) {
        let b = &self.bytes;
        defmt::write!(
            f,
            "{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}",
            b[5],
            b[4],
            b[3],
            b[2],
            b[1],
            b[0]
        )
    }
}

/// A connected peer, as seen by the GATT client.
///
/// Cloning yields another handle to the same connection.
pub trait GattLink: Clone {
    /// Discover primary service `service` and return the value handles of
    /// its characteristics with UUID `characteristic`.
    ///
    /// A missing service yields an empty list; `Err` means the transport
    /// failed.
    fn discover(
        &self,
        service: u16,
        characteristic: u16,
    ) -> impl Future<Output = Result<Handles, BleError>>;

    /// Read a characteristic value into `buf`, returning its length.
    fn read(
        &self,
        handle: CharHandle,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, BleError>>;
}

/// The local radio in Central role.
pub trait Central {
    type Link: GattLink;

    /// Listen for advertisements for `window_ms`, calling `on_report`
    /// with the advertiser address and raw advertising payload.
    ///
    /// Fails only if scanning cannot start.
    fn scan<F>(
        &mut self,
        window_ms: u64,
        on_report: F,
    ) -> impl Future<Output = Result<(), BleError>>
    where
        F: FnMut(DeviceAddress, &[u8]);

    /// Open a connection to `address`.
    fn connect(
        &mut self,
        address: DeviceAddress,
    ) -> impl Future<Output = Result<Self::Link, BleError>>;
}
