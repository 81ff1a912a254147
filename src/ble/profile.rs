//! GATT profile resolver.
//!
//! After connection, every node must expose:
//! 1. The identity service (0x2C05) with its one-byte ID characteristic.
//! 2. The sensor service of the configured kind, whose characteristic
//!    shares the service UUID.
//!
//! A node missing either is deactivated for the rest of the run.  The ID
//! comes from the static provisioning table if listed there, otherwise
//! from the identity characteristic, otherwise 0.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::ble::{DeviceAddress, GattLink, Handles};
use crate::config::GATT_READ_MAX;
use crate::context::BridgeContext;
use crate::directory::ServiceHandles;
use crate::error::{BleError, Error};
use crate::sensor::{SensorKind, IDENTITY_UUID16};

/// Resolve one connected node: discover its services, store the handles
/// and its ID.  Returns the ID.
///
/// Discovery failure deactivates the node and is returned as
/// `BleError::IdentityNotFound` or `BleError::SensorServiceNotFound`.
pub async fn resolve<M, L>(ctx: &BridgeContext<M, L>, address: &DeviceAddress) -> Result<u8, Error>
where
    M: RawMutex,
    L: GattLink,
{
    let link = ctx.directory.link(address).ok_or(Error::UnknownDevice)?;

    let handles = match discover_profile(&link, ctx.sensor).await {
        Ok(handles) => handles,
        Err(e) => {
            warn!("Profile discovery on {} failed: {} - deactivating", address, e);
            ctx.deactivate(address);
            return Err(e.into());
        }
    };

    let reported = match handles.identity.first() {
        Some(&handle) => read_identity(&link, address, handle).await,
        None => None,
    };
    let id = pick_id(address, ctx.id_table.lookup(address), reported);

    ctx.directory.set_profile(address, id, handles)?;
    info!("{} resolved as {} node {}", address, ctx.sensor.name(), id);
    Ok(id)
}

/// Resolve every active node in the directory.  Returns how many succeeded.
pub async fn resolve_all<M, L>(ctx: &BridgeContext<M, L>) -> usize
where
    M: RawMutex,
    L: GattLink,
{
    let mut resolved = 0;
    for address in ctx.directory.addresses() {
        let active = ctx.directory.get(&address).is_some_and(|r| r.active);
        if active && resolve(ctx, &address).await.is_ok() {
            resolved += 1;
        }
    }
    info!(
        "Profile resolution done - {} of {} nodes active",
        resolved,
        ctx.directory.len()
    );
    resolved
}

async fn discover_profile<L: GattLink>(
    link: &L,
    sensor: SensorKind,
) -> Result<ServiceHandles, BleError> {
    let identity = discover_one(link, IDENTITY_UUID16, BleError::IdentityNotFound).await?;
    let sensor_uuid = sensor.service_uuid16();
    let readings = discover_one(link, sensor_uuid, BleError::SensorServiceNotFound).await?;
    debug!(
        "Identity handle {}, {} handle {}",
        identity[0],
        sensor.name(),
        readings[0]
    );
    Ok(ServiceHandles {
        identity,
        sensor: Some((sensor, readings)),
    })
}

/// Discover `uuid` (service and characteristic share it).  An empty
/// result or transport error both map to `missing`.
async fn discover_one<L: GattLink>(link: &L, uuid: u16, missing: BleError) -> Result<Handles, BleError> {
    match link.discover(uuid, uuid).await {
        Ok(handles) if !handles.is_empty() => Ok(handles),
        Ok(_) => Err(missing),
        Err(e) => {
            debug!("Discovery of {=u16:#x} failed: {}", uuid, e);
            Err(missing)
        }
    }
}

async fn read_identity<L: GattLink>(link: &L, address: &DeviceAddress, handle: u16) -> Option<u8> {
    let mut buf = [0u8; GATT_READ_MAX];
    match link.read(handle, &mut buf).await {
        Ok(1) => Some(buf[0]),
        Ok(len) => {
            warn!("Identity of {} is {} bytes, expected 1", address, len);
            None
        }
        Err(e) => {
            warn!("Identity read on {} failed: {}", address, e);
            None
        }
    }
}

fn pick_id(address: &DeviceAddress, provisioned: Option<u8>, reported: Option<u8>) -> u8 {
    match (provisioned, reported) {
        (Some(id), Some(other)) if id != other => {
            warn!("{} reports ID {}, provisioned as {}", address, other, id);
            id
        }
        (Some(id), _) => id,
        (None, Some(id)) => id,
        (None, None) => {
            warn!("No ID for {} - using 0", address);
            0
        }
    }
}
