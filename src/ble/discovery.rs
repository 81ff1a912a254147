//! Discovery and connection manager.
//!
//! One bounded scan window collects matching advertisers into a small
//! queue; once the window closes the queue is drained and each node is
//! connected in turn.  Connecting happens only after scanning stops, so
//! the radio never does both at once.

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::ble::adv_filter::{extract_device_name, matches_service_signature, SIGNATURE_LEN};
use crate::ble::{Central, DeviceAddress};
use crate::config::{BLE_SCAN_QUEUE_LEN, BLE_SCAN_SEEN_LEN};
use crate::directory::DeviceDirectory;
use crate::error::{BleError, Error};

/// What happened to one advertisement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Offer {
    /// Matched and queued for connection.
    Queued,
    /// Matched, but the address was already seen in this window.
    Duplicate,
    /// Matched, but the queue was full.
    Dropped,
    /// Signature did not match.
    Filtered,
}

/// Advertisers collected during one scan window.
#[derive(Debug, Default)]
pub struct ScanQueue {
    seen: Vec<DeviceAddress, BLE_SCAN_SEEN_LEN>,
    queued: Vec<DeviceAddress, BLE_SCAN_QUEUE_LEN>,
    dropped: usize,
}

impl ScanQueue {
    pub const fn new() -> Self {
        Self {
            seen: Vec::new(),
            queued: Vec::new(),
            dropped: 0,
        }
    }

    /// Consider one advertisement.  Each matching address is queued at
    /// most once per window; it is remembered even if the queue drops it.
    pub fn offer(
        &mut self,
        address: DeviceAddress,
        data: &[u8],
        filter: &[u8; SIGNATURE_LEN],
    ) -> Offer {
        if !matches_service_signature(data, filter) {
            return Offer::Filtered;
        }
        if self.seen.contains(&address) {
            return Offer::Duplicate;
        }
        // A full seen-set only means later duplicates count as drops too.
        let _ = self.seen.push(address);
        match self.queued.push(address) {
            Ok(()) => Offer::Queued,
            Err(_) => {
                self.dropped += 1;
                Offer::Dropped
            }
        }
    }

    /// Queued addresses, first-seen first.
    pub fn queued(&self) -> &[DeviceAddress] {
        &self.queued
    }

    /// Matching advertisements lost to a full queue.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Scan for `window_ms`, then connect to every new node advertising
/// `filter`.
///
/// Returns the number of nodes added to `directory`.  Failed connections
/// are logged and skipped.  Only a scan that cannot start is an error.
pub async fn scan_and_connect<C, M>(
    central: &mut C,
    directory: &DeviceDirectory<M, C::Link>,
    filter: &[u8; SIGNATURE_LEN],
    window_ms: u64,
) -> Result<usize, Error>
where
    C: Central,
    M: RawMutex,
{
    info!("BLE scan starting ({} ms window)", window_ms);

    let mut queue = ScanQueue::new();
    central
        .scan(window_ms, |address, data| {
            if queue.offer(address, data, filter) == Offer::Queued {
                let name = extract_device_name(data);
                debug!("Found {} ({})", address, name.as_str());
            }
        })
        .await
        .map_err(|e| {
            error!("BLE scan failed: {}", e);
            Error::Ble(BleError::ScanFailed)
        })?;

    info!(
        "BLE scan complete - {} queued, {} dropped",
        queue.queued().len(),
        queue.dropped()
    );

    let mut added = 0;
    for &address in queue.queued() {
        if directory.contains(&address) {
            debug!("{} already connected", address);
            continue;
        }
        if directory.is_full() {
            warn!("Device directory full - ignoring {}", address);
            continue;
        }

        let link = match central.connect(address).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Connect to {} failed: {}", address, e);
                continue;
            }
        };

        match directory.insert(address, link) {
            Ok(()) => {
                info!("Connected to {}", address);
                added += 1;
            }
            Err(e) => warn!("Could not track {}: {}", address, e),
        }
    }

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_DEVICES;
    use crate::sensor::SensorKind;
    use crate::testing::{addr, advertisement, FakeCentral, FakeLink, FakeNode};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Directory = DeviceDirectory<CriticalSectionRawMutex, FakeLink>;

    const BATTERY: [u8; 16] = SensorKind::Battery.advertised_uuid();

    fn battery_node() -> FakeNode {
        FakeNode::new(SensorKind::Battery, 1, &[0x10, 0x0E])
    }

    #[test]
    fn queue_filters_and_dedups() {
        let mut queue = ScanQueue::new();
        let battery = advertisement(SensorKind::Battery);
        let gyro = advertisement(SensorKind::Gyro);

        assert_eq!(queue.offer(addr(1), &gyro, &BATTERY), Offer::Filtered);
        assert_eq!(queue.offer(addr(2), &battery, &BATTERY), Offer::Queued);
        assert_eq!(queue.offer(addr(2), &battery, &BATTERY), Offer::Duplicate);
        assert_eq!(queue.queued(), &[addr(2)]);
    }

    #[test]
    fn full_queue_drops_and_remembers() {
        let mut queue = ScanQueue::new();
        let battery = advertisement(SensorKind::Battery);
        for i in 0..BLE_SCAN_QUEUE_LEN as u8 {
            assert_eq!(queue.offer(addr(i), &battery, &BATTERY), Offer::Queued);
        }
        assert_eq!(queue.offer(addr(0xE0), &battery, &BATTERY), Offer::Dropped);
        assert_eq!(queue.offer(addr(0xE0), &battery, &BATTERY), Offer::Duplicate);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.queued().len(), BLE_SCAN_QUEUE_LEN);
    }

    #[test]
    fn only_matching_nodes_are_connected() {
        let mut central = FakeCentral::default();
        central.advertise(addr(1), &advertisement(SensorKind::Battery));
        central.advertise(addr(2), &advertisement(SensorKind::Temperature));
        central.add_node(addr(1), battery_node());
        central.add_node(addr(2), FakeNode::new(SensorKind::Temperature, 2, &[25, 0]));

        let dir = Directory::new();
        let added = block_on(scan_and_connect(&mut central, &dir, &BATTERY, 5_000)).unwrap();

        assert_eq!(added, 1);
        assert!(dir.contains(&addr(1)));
        assert!(!dir.contains(&addr(2)));
        assert_eq!(central.connect_attempts, std::vec![addr(1)]);
    }

    #[test]
    fn repeated_advertisements_cause_one_attempt() {
        let mut central = FakeCentral::default();
        for _ in 0..5 {
            central.advertise(addr(1), &advertisement(SensorKind::Battery));
        }
        central.add_node(addr(1), battery_node());

        let dir = Directory::new();
        block_on(scan_and_connect(&mut central, &dir, &BATTERY, 5_000)).unwrap();
        assert_eq!(central.connect_attempts.len(), 1);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn failed_connection_is_skipped() {
        let mut central = FakeCentral::default();
        central.advertise(addr(1), &advertisement(SensorKind::Battery));
        central.advertise(addr(2), &advertisement(SensorKind::Battery));
        // addr(1) is not connectable.
        central.add_node(addr(2), battery_node());

        let dir = Directory::new();
        let added = block_on(scan_and_connect(&mut central, &dir, &BATTERY, 5_000)).unwrap();

        assert_eq!(added, 1);
        assert_eq!(central.connect_attempts, std::vec![addr(1), addr(2)]);
        assert!(!dir.contains(&addr(1)));
        let record = dir.get(&addr(2)).unwrap();
        assert!(record.active);
        assert!(record.handles.is_empty());
    }

    #[test]
    fn rescan_skips_known_nodes() {
        let mut central = FakeCentral::default();
        central.advertise(addr(1), &advertisement(SensorKind::Battery));
        central.add_node(addr(1), battery_node());

        let dir = Directory::new();
        assert_eq!(
            block_on(scan_and_connect(&mut central, &dir, &BATTERY, 5_000)),
            Ok(1)
        );
        assert_eq!(
            block_on(scan_and_connect(&mut central, &dir, &BATTERY, 5_000)),
            Ok(0)
        );
        assert_eq!(central.connect_attempts.len(), 1);
    }

    #[test]
    fn full_directory_stops_connecting() {
        let mut central = FakeCentral::default();
        let dir = Directory::new();
        for i in 0..MAX_DEVICES as u8 {
            dir.insert(addr(0x80 + i), battery_node().link()).unwrap();
        }
        central.advertise(addr(1), &advertisement(SensorKind::Battery));
        central.add_node(addr(1), battery_node());

        assert_eq!(
            block_on(scan_and_connect(&mut central, &dir, &BATTERY, 5_000)),
            Ok(0)
        );
        assert!(central.connect_attempts.is_empty());
    }

    #[test]
    fn scan_start_failure_is_reported() {
        let mut central = FakeCentral {
            scan_fails: true,
            ..Default::default()
        };
        let dir = Directory::new();
        assert_eq!(
            block_on(scan_and_connect(&mut central, &dir, &BATTERY, 5_000)),
            Err(Error::Ble(BleError::ScanFailed))
        );
        assert!(dir.is_empty());
    }
}
