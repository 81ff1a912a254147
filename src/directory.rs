//! Device directory - per-node connection state.
//!
//! Built by discovery, enriched by the profile resolver, consulted by the
//! poller.  Records are never removed during a run; a node that fails
//! discovery is only marked inactive.
//!
//! All access goes through one blocking mutex.  Every operation copies in
//! or out under the lock and never awaits while holding it.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::ble::{CharHandle, DeviceAddress, Handles};
use crate::config::MAX_DEVICES;
use crate::error::Error;
use crate::sensor::SensorKind;

/// Key of the identity service handles.
pub const IDENTITY_SERVICE: &str = "identity";

/// Characteristic handles resolved for one node.  Set once by the profile
/// resolver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceHandles {
    /// Identity service characteristic(s).
    pub identity: Handles,
    /// Sensor service characteristic(s), keyed by sensor kind.
    pub sensor: Option<(SensorKind, Handles)>,
}

impl ServiceHandles {
    /// Look up handles by service name: `"identity"` or a sensor name.
    pub fn get(&self, service: &str) -> Option<&Handles> {
        if service == IDENTITY_SERVICE {
            return (!self.identity.is_empty()).then_some(&self.identity);
        }
        match &self.sensor {
            Some((kind, handles)) if kind.name() == service => Some(handles),
            _ => None,
        }
    }

    /// First sensor characteristic, the one the poller reads.
    pub fn sensor_handle(&self) -> Option<CharHandle> {
        self.sensor
            .as_ref()
            .and_then(|(_, handles)| handles.first().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.identity.is_empty() && self.sensor.is_none()
    }
}

/// Connection state of one sensor node.
#[derive(Clone, Debug)]
pub struct DeviceRecord<L> {
    pub address: DeviceAddress,
    /// Transport handle.
    pub link: L,
    /// `false` once discovery failed; never flips back.
    pub active: bool,
    /// Numeric node ID (0 until resolved or if unknown).
    pub id: u8,
    pub handles: ServiceHandles,
    /// Failed characteristic reads since connect.
    pub read_failures: u32,
}

/// What the poller needs to read one node, copied out of the directory.
#[derive(Clone, Debug)]
pub struct PollTarget<L> {
    pub address: DeviceAddress,
    pub id: u8,
    pub link: L,
    pub handle: CharHandle,
}

/// Directory of every node connected during this run.
pub struct DeviceDirectory<M: RawMutex, L> {
    records: Mutex<M, RefCell<Vec<DeviceRecord<L>, MAX_DEVICES>>>,
}

impl<M: RawMutex, L: Clone> DeviceDirectory<M, L> {
    pub const fn new() -> Self {
        Self {
            records: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Add a freshly connected node (`active`, empty handles).
    pub fn insert(&self, address: DeviceAddress, link: L) -> Result<(), Error> {
        self.records.lock(|records| {
            let mut records = records.borrow_mut();
            if records.iter().any(|r| r.address == address) {
                return Err(Error::AlreadyKnown);
            }
            records
                .push(DeviceRecord {
                    address,
                    link,
                    active: true,
                    id: 0,
                    handles: ServiceHandles::default(),
                    read_failures: 0,
                })
                .map_err(|_| Error::DirectoryFull)
        })
    }

    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.records
            .lock(|records| records.borrow().iter().any(|r| &r.address == address))
    }

    /// Copy of one record.
    pub fn get(&self, address: &DeviceAddress) -> Option<DeviceRecord<L>> {
        self.records.lock(|records| {
            records
                .borrow()
                .iter()
                .find(|r| &r.address == address)
                .cloned()
        })
    }

    /// Another handle to the node's connection.
    pub fn link(&self, address: &DeviceAddress) -> Option<L> {
        self.records.lock(|records| {
            records
                .borrow()
                .iter()
                .find(|r| &r.address == address)
                .map(|r| r.link.clone())
        })
    }

    /// Permanently exclude a node from polling.  Returns `false` if the
    /// address is unknown.
    pub fn deactivate(&self, address: &DeviceAddress) -> bool {
        self.with_record(address, |r| r.active = false).is_some()
    }

    /// Store resolved ID and handles.  Inactive nodes stay inactive.
    pub fn set_profile(
        &self,
        address: &DeviceAddress,
        id: u8,
        handles: ServiceHandles,
    ) -> Result<(), Error> {
        self.with_record(address, |r| {
            r.id = id;
            r.handles = handles;
        })
        .ok_or(Error::UnknownDevice)
    }

    /// Count a failed read; returns the new total.
    pub fn record_read_failure(&self, address: &DeviceAddress) -> u32 {
        self.with_record(address, |r| {
            r.read_failures = r.read_failures.saturating_add(1);
            r.read_failures
        })
        .unwrap_or(0)
    }

    /// Active, fully resolved nodes.
    pub fn active_targets(&self) -> Vec<PollTarget<L>, MAX_DEVICES> {
        self.records.lock(|records| {
            records
                .borrow()
                .iter()
                .filter(|r| r.active)
                .filter_map(|r| {
                    r.handles.sensor_handle().map(|handle| PollTarget {
                        address: r.address,
                        id: r.id,
                        link: r.link.clone(),
                        handle,
                    })
                })
                .collect()
        })
    }

    /// Every known address, in insertion order.
    pub fn addresses(&self) -> Vec<DeviceAddress, MAX_DEVICES> {
        self.records
            .lock(|records| records.borrow().iter().map(|r| r.address).collect())
    }

    pub fn len(&self) -> usize {
        self.records.lock(|records| records.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= MAX_DEVICES
    }

    pub fn active_count(&self) -> usize {
        self.records
            .lock(|records| records.borrow().iter().filter(|r| r.active).count())
    }

    fn with_record<U>(
        &self,
        address: &DeviceAddress,
        f: impl FnOnce(&mut DeviceRecord<L>) -> U,
    ) -> Option<U> {
        self.records.lock(|records| {
            records
                .borrow_mut()
                .iter_mut()
                .find(|r| &r.address == address)
                .map(f)
        })
    }
}

impl<M: RawMutex, L: Clone> Default for DeviceDirectory<M, L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Directory = DeviceDirectory<CriticalSectionRawMutex, u8>;

    fn addr(last: u8) -> DeviceAddress {
        DeviceAddress::new(DeviceAddress::RANDOM_STATIC, [last, 0, 0, 0, 0, 0xC0])
    }

    fn resolved(handle: CharHandle) -> ServiceHandles {
        let mut identity = Handles::new();
        identity.push(0x0010).unwrap();
        let mut sensor = Handles::new();
        sensor.push(handle).unwrap();
        ServiceHandles {
            identity,
            sensor: Some((SensorKind::Battery, sensor)),
        }
    }

    #[test]
    fn insert_starts_active_and_unresolved() {
        let dir = Directory::new();
        dir.insert(addr(1), 7).unwrap();
        let record = dir.get(&addr(1)).unwrap();
        assert!(record.active);
        assert_eq!(record.id, 0);
        assert!(record.handles.is_empty());
        assert_eq!(record.link, 7);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let dir = Directory::new();
        dir.insert(addr(1), 1).unwrap();
        assert_eq!(dir.insert(addr(1), 2), Err(Error::AlreadyKnown));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.link(&addr(1)), Some(1));
    }

    #[test]
    fn full_directory_is_rejected() {
        let dir = Directory::new();
        for i in 0..MAX_DEVICES as u8 {
            dir.insert(addr(i), i).unwrap();
        }
        assert!(dir.is_full());
        assert_eq!(dir.insert(addr(0xEE), 0), Err(Error::DirectoryFull));
    }

    #[test]
    fn unresolved_nodes_are_not_polled() {
        let dir = Directory::new();
        dir.insert(addr(1), 1).unwrap();
        assert!(dir.active_targets().is_empty());

        dir.set_profile(&addr(1), 3, resolved(0x0021)).unwrap();
        let targets = dir.active_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, 3);
        assert_eq!(targets[0].handle, 0x0021);
    }

    #[test]
    fn deactivated_nodes_are_kept_but_not_polled() {
        let dir = Directory::new();
        dir.insert(addr(1), 1).unwrap();
        dir.insert(addr(2), 2).unwrap();
        dir.set_profile(&addr(1), 1, resolved(0x0021)).unwrap();
        dir.set_profile(&addr(2), 2, resolved(0x0031)).unwrap();

        assert!(dir.deactivate(&addr(1)));
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.active_count(), 1);
        let targets = dir.active_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].address, addr(2));
    }

    #[test]
    fn operations_on_unknown_address() {
        let dir = Directory::new();
        assert!(!dir.deactivate(&addr(9)));
        assert_eq!(
            dir.set_profile(&addr(9), 1, ServiceHandles::default()),
            Err(Error::UnknownDevice)
        );
        assert_eq!(dir.record_read_failure(&addr(9)), 0);
        assert!(dir.link(&addr(9)).is_none());
    }

    #[test]
    fn read_failures_accumulate() {
        let dir = Directory::new();
        dir.insert(addr(1), 1).unwrap();
        assert_eq!(dir.record_read_failure(&addr(1)), 1);
        assert_eq!(dir.record_read_failure(&addr(1)), 2);
        assert!(dir.get(&addr(1)).unwrap().active);
    }

    #[test]
    fn handles_are_looked_up_by_service_name() {
        let handles = resolved(0x0021);
        assert_eq!(handles.get("identity").map(|h| h[0]), Some(0x0010));
        assert_eq!(handles.get("Battery").map(|h| h[0]), Some(0x0021));
        assert!(handles.get("Gyro").is_none());
        assert!(ServiceHandles::default().get("identity").is_none());
    }
}
