//! Host-testable core of the BLE → I2C sensor bridge.
//!
//! Everything that does not touch the radio or the TWIS peripheral lives
//! here: advertisement filtering, discovery and profile resolution over
//! the [`ble::Central`] / [`ble::GattLink`] ports, the sensor poller, the
//! readings cache and the I2C register file.
//!
//! Usage: `cargo test` (host), `cargo build --release --features embedded
//! --target thumbv7em-none-eabihf` (firmware).
//!
//! Note: The embedded binary in main.rs wires these modules to the
//! SoftDevice and TWIS adapters, which only build with the `embedded`
//! feature.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod cache;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod i2c;
pub mod poller;
pub mod provisioning;
pub mod sensor;

#[cfg(test)]
mod testing;

pub use context::BridgeContext;
pub use error::Error;
pub use sensor::SensorKind;
