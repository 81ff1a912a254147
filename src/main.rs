//! BLE → I2C sensor bridge firmware for the nRF52840.
//!
//! Boot sequence:
//! 1. Resolve the build-time configuration (sensor type, ID table, bus
//!    address).  Invalid configuration halts here.
//! 2. Enable the SoftDevice (S140) in Central role.
//! 3. Scan once, connect to every matching sensor node, resolve profiles.
//! 4. Spawn the steady-state tasks: the poller (1 s tick) and the I2C
//!    target bridge.

#![no_std]
#![no_main]

use core::mem;

use ble_i2c_bridge::ble::discovery::scan_and_connect;
use ble_i2c_bridge::ble::profile::resolve_all;
use ble_i2c_bridge::ble::softdevice::{SoftdeviceCentral, SoftdeviceLink};
use ble_i2c_bridge::config::{BridgeConfig, BLE_SCAN_WINDOW_MS, MAX_DEVICES};
use ble_i2c_bridge::i2c::bridge::TargetBridge;
use ble_i2c_bridge::i2c::twis::TwisTarget;
use ble_i2c_bridge::{poller, BridgeContext};
use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::twis::{self, Twis};
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

type Ctx = BridgeContext<CriticalSectionRawMutex, SoftdeviceLink>;

bind_interrupts!(struct Irqs {
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twis::InterruptHandler<peripherals::TWISPI0>;
});

const DEVICE_NAME: &[u8] = b"BleI2cBridge";

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn poller_task(ctx: &'static Ctx) -> ! {
    poller::run(ctx).await
}

#[embassy_executor::task]
async fn bridge_task(ctx: &'static Ctx, twis: Twis<'static, peripherals::TWISPI0>) -> ! {
    let mut target = TwisTarget::new(twis);
    let mut bridge = TargetBridge::new(ctx.sensor);
    bridge.serve(&mut target, &ctx.cache).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let config = match BridgeConfig::from_build_env() {
        Ok(config) => config,
        Err(e) => defmt::panic!("Invalid configuration: {}", e),
    };
    info!(
        "BLE-I2C bridge: {} sensor at I2C {=u8:#x}, {} provisioned IDs",
        config.sensor.name(),
        config.i2c_address,
        config.id_table.len()
    );

    // Interrupt levels 0, 1 and 4 belong to the SoftDevice.
    let mut hal_config = embassy_nrf::config::Config::default();
    hal_config.gpiote_interrupt_priority = Priority::P2;
    hal_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(hal_config);
    interrupt::SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0.set_priority(Priority::P3);

    let sd: &'static Softdevice = Softdevice::enable(&softdevice_config());
    unwrap!(spawner.spawn(softdevice_task(sd)));

    let i2c_address = config.i2c_address;
    static CONTEXT: StaticCell<Ctx> = StaticCell::new();
    let ctx: &'static Ctx = CONTEXT.init(BridgeContext::from_config(config));

    let mut central = SoftdeviceCentral::new(sd);
    let filter = ctx.sensor.advertised_uuid();
    match scan_and_connect(&mut central, &ctx.directory, &filter, BLE_SCAN_WINDOW_MS).await {
        Ok(added) => info!("{} sensor nodes connected", added),
        Err(e) => warn!("Discovery failed: {} - serving empty readings", e),
    }
    resolve_all(ctx).await;

    // TWIS pins: SDA P0.26, SCL P0.27.
    let mut twis_config = twis::Config::default();
    twis_config.address0 = i2c_address;
    let twis = Twis::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twis_config);

    unwrap!(spawner.spawn(poller_task(ctx)));
    unwrap!(spawner.spawn(bridge_task(ctx, twis)));
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: MAX_DEVICES as u8,
            event_length: 6,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: raw::BLE_GATT_ATT_MTU_DEFAULT as u16,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: raw::BLE_GAP_ADV_SET_COUNT_DEFAULT as u8,
            periph_role_count: 0,
            central_role_count: MAX_DEVICES as u8,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}
