//! Static address→ID provisioning table.
//!
//! Nodes whose identity characteristic is missing or wrong can be given an
//! ID at build time:
//!
//! ```text
//! BRIDGE_ID_TABLE="C0:11:22:33:44:55=3, C0:11:22:33:44:66=4"
//! ```
//!
//! A table entry always wins over the value the node reports.

use heapless::Vec;

use crate::ble::DeviceAddress;
use crate::config::MAX_DEVICES;
use crate::error::ConfigError;

/// Fixed-capacity map from device address to node ID.
///
/// Matching uses the 48-bit address only; the address type is ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdTable {
    entries: Vec<(DeviceAddress, u8), MAX_DEVICES>,
}

impl IdTable {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Parse a comma-separated list of `ADDRESS=ID` pairs.  IDs are
    /// decimal.  An empty string yields an empty table.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (address, id) = item.split_once('=').ok_or(ConfigError::InvalidIdTable)?;
            let address = DeviceAddress::parse(address).ok_or(ConfigError::InvalidIdTable)?;
            let id = id
                .trim()
                .parse::<u8>()
                .map_err(|_| ConfigError::InvalidIdTable)?;
            table.insert(address, id)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, address: DeviceAddress, id: u8) -> Result<(), ConfigError> {
        if self.lookup(&address).is_some() {
            return Err(ConfigError::DuplicateId);
        }
        self.entries
            .push((address, id))
            .map_err(|_| ConfigError::IdTableFull)
    }

    pub fn lookup(&self, address: &DeviceAddress) -> Option<u8> {
        self.entries
            .iter()
            .find(|(known, _)| known.same_device(address))
            .map(|&(_, id)| id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
