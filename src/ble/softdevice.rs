//! SoftDevice S140 implementation of the [`Central`] / [`GattLink`] ports.

use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{
    self, Characteristic, Client, Descriptor, DiscoverError, HvxType,
};
use nrf_softdevice::ble::{central, Address, AddressType, Connection, Uuid};
use nrf_softdevice::{raw, Softdevice};

use crate::ble::{Central, CharHandle, DeviceAddress, GattLink, Handles};
use crate::config::{
    BLE_CONNECT_TIMEOUT, BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_SLAVE_LATENCY,
    BLE_SUP_TIMEOUT, MAX_CHARS_PER_SERVICE,
};
use crate::error::BleError;
use crate::sensor::{SensorKind, IDENTITY_UUID16};

const BATTERY_UUID16: u16 = SensorKind::Battery.service_uuid16();
const TEMPERATURE_UUID16: u16 = SensorKind::Temperature.service_uuid16();
const GYRO_UUID16: u16 = SensorKind::Gyro.service_uuid16();

/// Characteristics kept per probed service, before filtering by UUID.
const MAX_PROBED_CHARS: usize = 8;

/// The local radio in Central role.
pub struct SoftdeviceCentral {
    sd: &'static Softdevice,
}

impl SoftdeviceCentral {
    pub fn new(sd: &'static Softdevice) -> Self {
        Self { sd }
    }
}

/// An open connection.  Clones share the link.
#[derive(Clone)]
pub struct SoftdeviceLink {
    conn: Connection,
}

impl Central for SoftdeviceCentral {
    type Link = SoftdeviceLink;

    async fn scan<F>(&mut self, window_ms: u64, mut on_report: F) -> Result<(), BleError>
    where
        F: FnMut(DeviceAddress, &[u8]),
    {
        let config = central::ScanConfig {
            // Node payloads carry the signature in the advertisement itself.
            active: false,
            timeout: u16::try_from(window_ms / 10).unwrap_or(u16::MAX),
            ..Default::default()
        };

        let result = central::scan(self.sd, &config, |params| {
            let data =
                unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
            on_report(from_softdevice(Address::from_raw(params.peer_addr)), data);
            None::<()>
        })
        .await;

        match result {
            Ok(()) | Err(central::ScanError::Timeout) => Ok(()),
            Err(e) => {
                warn!("SoftDevice scan error: {}", e);
                Err(BleError::ScanFailed)
            }
        }
    }

    async fn connect(&mut self, address: DeviceAddress) -> Result<SoftdeviceLink, BleError> {
        let peer = to_softdevice(&address);
        let whitelist = [&peer];
        let config = central::ConnectConfig {
            scan_config: central::ScanConfig {
                whitelist: Some(&whitelist),
                timeout: BLE_CONNECT_TIMEOUT,
                ..Default::default()
            },
            conn_params: raw::ble_gap_conn_params_t {
                min_conn_interval: BLE_CONN_INTERVAL_MIN,
                max_conn_interval: BLE_CONN_INTERVAL_MAX,
                slave_latency: BLE_SLAVE_LATENCY,
                conn_sup_timeout: BLE_SUP_TIMEOUT,
            },
            ..Default::default()
        };

        let conn = central::connect(self.sd, &config)
            .await
            .map_err(|_| BleError::ConnectFailed)?;
        Ok(SoftdeviceLink { conn })
    }
}

impl GattLink for SoftdeviceLink {
    async fn discover(&self, service: u16, characteristic: u16) -> Result<Handles, BleError> {
        let found = match service {
            IDENTITY_UUID16 => probe::<IDENTITY_UUID16>(&self.conn).await?,
            BATTERY_UUID16 => probe::<BATTERY_UUID16>(&self.conn).await?,
            TEMPERATURE_UUID16 => probe::<TEMPERATURE_UUID16>(&self.conn).await?,
            GYRO_UUID16 => probe::<GYRO_UUID16>(&self.conn).await?,
            _ => return Ok(Handles::new()),
        };

        let wanted = Uuid::new_16(characteristic);
        Ok(found
            .iter()
            .filter(|(uuid, _)| *uuid == wanted)
            .map(|&(_, handle)| handle)
            .take(MAX_CHARS_PER_SERVICE)
            .collect())
    }

    async fn read(&self, handle: CharHandle, buf: &mut [u8]) -> Result<usize, BleError> {
        gatt_client::read(&self.conn, handle, buf)
            .await
            .map_err(|e| match e {
                gatt_client::ReadError::Disconnected => BleError::Disconnected,
                _ => BleError::ReadFailed,
            })
    }
}

/// Discovery client for primary service `SERVICE`; records every 16-bit
/// characteristic it finds.
struct ServiceProbe<const SERVICE: u16> {
    chars: Vec<(Uuid, CharHandle), MAX_PROBED_CHARS>,
}

impl<const SERVICE: u16> Client for ServiceProbe<SERVICE> {
    type Event = ();

    fn on_hvx(&self, _conn: &Connection, _type: HvxType, _handle: u16, _data: &[u8]) -> Option<()> {
        None
    }

    fn uuid() -> Uuid {
        Uuid::new_16(SERVICE)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self { chars: Vec::new() }
    }

    fn discovered_characteristic(&mut self, characteristic: &Characteristic, _descriptors: &[Descriptor]) {
        if let Some(uuid) = characteristic.uuid {
            if self.chars.push((uuid, characteristic.handle_value)).is_err() {
                warn!("Service {=u16:#x}: too many characteristics", SERVICE);
            }
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

async fn probe<const SERVICE: u16>(
    conn: &Connection,
) -> Result<Vec<(Uuid, CharHandle), MAX_PROBED_CHARS>, BleError> {
    match gatt_client::discover::<ServiceProbe<SERVICE>>(conn).await {
        Ok(client) => Ok(client.chars),
        Err(DiscoverError::ServiceNotFound) => Ok(Vec::new()),
        Err(_) => Err(BleError::DiscoveryFailed),
    }
}

fn from_softdevice(address: Address) -> DeviceAddress {
    let kind = match address.address_type() {
        AddressType::Public => 0,
        AddressType::RandomStatic => 1,
        AddressType::RandomPrivateResolvable => 2,
        AddressType::RandomPrivateNonResolvable => 3,
        AddressType::Anonymous => 4,
    };
    DeviceAddress::new(kind, address.bytes())
}

fn to_softdevice(address: &DeviceAddress) -> Address {
    let kind = match address.kind {
        0 => AddressType::Public,
        2 => AddressType::RandomPrivateResolvable,
        3 => AddressType::RandomPrivateNonResolvable,
        4 => AddressType::Anonymous,
        _ => AddressType::RandomStatic,
    };
    Address::new(kind, address.bytes)
}
