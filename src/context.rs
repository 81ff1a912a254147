//! Shared bridge state.
//!
//! Built once at startup and handed by `&'static` reference to the poller
//! and the I2C bridge task.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::ble::DeviceAddress;
use crate::cache::ReadingsCache;
use crate::config::BridgeConfig;
use crate::directory::DeviceDirectory;
use crate::provisioning::IdTable;
use crate::sensor::SensorKind;

/// Everything the steady-state tasks share.
pub struct BridgeContext<M: RawMutex, L> {
    /// Sensor type served by this build.
    pub sensor: SensorKind,
    /// Static address→ID overrides.
    pub id_table: IdTable,
    pub cache: ReadingsCache<M>,
    pub directory: DeviceDirectory<M, L>,
}

impl<M: RawMutex, L: Clone> BridgeContext<M, L> {
    pub fn new(sensor: SensorKind, id_table: IdTable) -> Self {
        Self {
            sensor,
            id_table,
            cache: ReadingsCache::new(),
            directory: DeviceDirectory::new(),
        }
    }

    pub fn from_config(config: BridgeConfig) -> Self {
        Self::new(config.sensor, config.id_table)
    }

    /// Stop polling `address` and hide its stale reading from the bus.
    pub fn deactivate(&self, address: &DeviceAddress) {
        if self.directory.deactivate(address) {
            self.cache.retire(address);
        }
    }
}
