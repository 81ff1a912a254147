//! In-memory radio for unit tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use crate::ble::{Central, CharHandle, DeviceAddress, GattLink, Handles};
use crate::error::BleError;
use crate::sensor::{SensorKind, IDENTITY_UUID16};

pub const IDENTITY_HANDLE: CharHandle = 0x0010;
pub const SENSOR_HANDLE: CharHandle = 0x0020;

/// GATT server of one simulated sensor node.
#[derive(Debug, Default)]
pub struct FakeNode {
    /// Identity characteristic value; `None` = service absent.
    pub identity: Option<Vec<u8>>,
    pub identity_read_fails: bool,
    /// UUID of the sensor service the node exposes.
    pub sensor_service: Option<u16>,
    pub sensor_value: Vec<u8>,
    pub sensor_read_fails: bool,
    pub discover_fails: bool,
    pub sensor_reads: usize,
}

impl FakeNode {
    /// A well-behaved node of `kind` reporting `id`.
    pub fn new(kind: SensorKind, id: u8, value: &[u8]) -> Self {
        Self {
            identity: Some(std::vec![id]),
            sensor_service: Some(kind.service_uuid16()),
            sensor_value: value.to_vec(),
            ..Default::default()
        }
    }

    pub fn link(self) -> FakeLink {
        FakeLink(Rc::new(RefCell::new(self)))
    }
}

/// Connection to a [`FakeNode`]; clones share the node.
#[derive(Clone, Debug)]
pub struct FakeLink(pub Rc<RefCell<FakeNode>>);

impl FakeLink {
    pub fn node(&self) -> std::cell::RefMut<'_, FakeNode> {
        self.0.borrow_mut()
    }
}

impl GattLink for FakeLink {
    async fn discover(&self, service: u16, characteristic: u16) -> Result<Handles, BleError> {
        let node = self.0.borrow();
        if node.discover_fails {
            return Err(BleError::DiscoveryFailed);
        }
        let mut handles = Handles::new();
        if service == IDENTITY_UUID16 && characteristic == IDENTITY_UUID16 {
            if node.identity.is_some() {
                let _ = handles.push(IDENTITY_HANDLE);
            }
        } else if node.sensor_service == Some(service) && characteristic == service {
            let _ = handles.push(SENSOR_HANDLE);
        }
        Ok(handles)
    }

    async fn read(&self, handle: CharHandle, buf: &mut [u8]) -> Result<usize, BleError> {
        let mut node = self.0.borrow_mut();
        let value = match handle {
            IDENTITY_HANDLE if !node.identity_read_fails => {
                node.identity.clone().ok_or(BleError::ReadFailed)?
            }
            SENSOR_HANDLE => {
                node.sensor_reads += 1;
                if node.sensor_read_fails {
                    return Err(BleError::ReadFailed);
                }
                node.sensor_value.clone()
            }
            _ => return Err(BleError::ReadFailed),
        };
        let len = value.len().min(buf.len());
        buf[..len].copy_from_slice(&value[..len]);
        Ok(len)
    }
}

/// Simulated radio: a fixed set of advertisements and connectable nodes.
#[derive(Default)]
pub struct FakeCentral {
    pub adverts: Vec<(DeviceAddress, Vec<u8>)>,
    pub nodes: Vec<(DeviceAddress, FakeLink)>,
    pub connect_attempts: Vec<DeviceAddress>,
    pub scan_fails: bool,
}

impl FakeCentral {
    pub fn advertise(&mut self, address: DeviceAddress, payload: &[u8]) {
        self.adverts.push((address, payload.to_vec()));
    }

    /// Make `address` connectable.
    pub fn add_node(&mut self, address: DeviceAddress, node: FakeNode) -> FakeLink {
        let link = node.link();
        self.nodes.push((address, link.clone()));
        link
    }
}

impl Central for FakeCentral {
    type Link = FakeLink;

    async fn scan<F>(&mut self, _window_ms: u64, mut on_report: F) -> Result<(), BleError>
    where
        F: FnMut(DeviceAddress, &[u8]),
    {
        if self.scan_fails {
            return Err(BleError::ScanFailed);
        }
        for (address, payload) in &self.adverts {
            on_report(*address, payload);
        }
        Ok(())
    }

    async fn connect(&mut self, address: DeviceAddress) -> Result<FakeLink, BleError> {
        self.connect_attempts.push(address);
        self.nodes
            .iter()
            .find(|(known, _)| *known == address)
            .map(|(_, link)| link.clone())
            .ok_or(BleError::ConnectFailed)
    }
}

/// Random static address ending in `last`.
pub fn addr(last: u8) -> DeviceAddress {
    DeviceAddress::new(DeviceAddress::RANDOM_STATIC, [last, 0x22, 0x33, 0x44, 0x55, 0xC0])
}

/// Advertising payload the node firmware sends for `kind`.
pub fn advertisement(kind: SensorKind) -> Vec<u8> {
    let mut adv = std::vec![0x02, 0x01, 0x06, 0x11, 0x07];
    adv.extend_from_slice(&kind.advertised_uuid());
    adv.extend_from_slice(&[0x05, 0x09, b'N', b'o', b'd', b'e']);
    adv
}
