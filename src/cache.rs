//! Readings cache - latest sample per sensor node.
//!
//! Written by the poller, read by the I2C bridge.  One blocking mutex
//! guards the whole table so a bus reply never sees a half-written
//! reading.  Lock scopes only copy; nothing awaits or talks to hardware
//! while the lock is held.
//!
//! Each entry carries a generation counter bumped on every `set`.  The
//! bridge clears `is_new` only on entries whose generation still matches
//! the snapshot it replied with, so a sample that lands between the reply
//! and the flag-clear is reported on the next read instead of being lost.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::ble::DeviceAddress;
use crate::config::MAX_DEVICES;
use crate::error::Error;
use crate::sensor::SensorKind;

/// Sensor payload, always exactly `SensorKind::payload_len()` bytes.
pub type Payload = Vec<u8, { SensorKind::MAX_PAYLOAD_LEN }>;

/// Latest sample of one node.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Not yet included in a bus reply.
    pub is_new: bool,
    /// Node ID.
    pub id: u8,
    pub payload: Payload,
    /// The characteristic returned a different length than expected.
    pub suspect: bool,
    /// Uptime at which the sample was taken.
    pub sampled_at_ms: u64,
}

impl Reading {
    /// Build a new sample from a raw characteristic value, truncating or
    /// zero-padding it to the sensor's payload length.
    pub fn from_sample(sensor: SensorKind, id: u8, raw: &[u8], sampled_at_ms: u64) -> Self {
        let len = sensor.payload_len();
        let mut payload = Payload::new();
        let fits = payload.extend_from_slice(&raw[..raw.len().min(len)]).is_ok()
            && payload.resize(len, 0).is_ok();
        debug_assert!(fits, "{} payload exceeds MAX_PAYLOAD_LEN", sensor.name());
        Self {
            is_new: true,
            id,
            payload,
            suspect: raw.len() != len,
            sampled_at_ms,
        }
    }
}

/// A reading copied out of the cache, tagged with its generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub address: DeviceAddress,
    pub reading: Reading,
    generation: u32,
}

/// Consistent copy of every live cache entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry, MAX_DEVICES>,
}

impl Snapshot {
    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the first `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

#[derive(Clone, Debug)]
struct Entry {
    address: DeviceAddress,
    reading: Reading,
    generation: u32,
    retired: bool,
}

/// Shared cache of the latest reading for each node.
pub struct ReadingsCache<M: RawMutex> {
    entries: Mutex<M, RefCell<Vec<Entry, MAX_DEVICES>>>,
}

impl<M: RawMutex> ReadingsCache<M> {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Insert or replace the reading for `address`.
    pub fn set(&self, address: DeviceAddress, reading: Reading) -> Result<(), Error> {
        self.entries.lock(|entries| {
            let mut entries = entries.borrow_mut();
            if let Some(entry) = entries.iter_mut().find(|e| e.address == address) {
                entry.reading = reading;
                entry.generation = entry.generation.wrapping_add(1);
                return Ok(());
            }
            entries
                .push(Entry {
                    address,
                    reading,
                    generation: 0,
                    retired: false,
                })
                .map_err(|_| Error::CacheFull)
        })
    }

    /// Copy of the reading for `address`, retired or not.
    pub fn get(&self, address: &DeviceAddress) -> Option<Reading> {
        self.entries.lock(|entries| {
            entries
                .borrow()
                .iter()
                .find(|e| &e.address == address)
                .map(|e| e.reading.clone())
        })
    }

    /// Copy of every live entry, in insertion order.
    pub fn get_snapshot(&self) -> Snapshot {
        let entries = self.entries.lock(|entries| {
            entries
                .borrow()
                .iter()
                .filter(|e| !e.retired)
                .map(|e| SnapshotEntry {
                    address: e.address,
                    reading: e.reading.clone(),
                    generation: e.generation,
                })
                .collect()
        });
        Snapshot { entries }
    }

    /// Clear `is_new` on the entries of `snapshot` that have not been
    /// overwritten since.
    pub fn mark_reported(&self, snapshot: &Snapshot) {
        self.entries.lock(|entries| {
            let mut entries = entries.borrow_mut();
            for reported in snapshot.iter() {
                if let Some(entry) = entries
                    .iter_mut()
                    .find(|e| e.address == reported.address && e.generation == reported.generation)
                {
                    entry.reading.is_new = false;
                }
            }
        });
    }

    /// Hide the entry of a deactivated node from future snapshots.  The
    /// stale reading is kept.
    pub fn retire(&self, address: &DeviceAddress) {
        self.entries.lock(|entries| {
            if let Some(entry) = entries
                .borrow_mut()
                .iter_mut()
                .find(|e| &e.address == address)
            {
                entry.retired = true;
            }
        });
    }

    /// Number of entries, retired included.
    pub fn len(&self) -> usize {
        self.entries.lock(|entries| entries.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: RawMutex> Default for ReadingsCache<M> {
    fn default() -> Self {
        Self::new()
    }
}
