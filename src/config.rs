//! Application-wide constants and compile-time configuration.
//!
//! All timing parameters, capacities and protocol constants live here so
//! they can be tuned in one place.  The sensor type, the address→ID table
//! and an optional I2C address override are picked at build time from the
//! environment (see [`BridgeConfig::from_build_env`]).

use crate::error::ConfigError;
use crate::provisioning::IdTable;
use crate::sensor::SensorKind;

// BLE

/// Duration of the BLE discovery window (milliseconds).
pub const BLE_SCAN_WINDOW_MS: u64 = 5_000;

/// Maximum number of matching advertisers queued during one scan window.
pub const BLE_SCAN_QUEUE_LEN: usize = 8;

/// Distinct matching advertisers remembered during one scan window,
/// including those the full queue dropped.
pub const BLE_SCAN_SEEN_LEN: usize = 32;

/// Connection attempt timeout (in 10 ms units). 300 = 3 s.
pub const BLE_CONNECT_TIMEOUT: u16 = 300;

/// Maximum number of sensor nodes tracked (directory and cache capacity).
pub const MAX_DEVICES: usize = 8;

/// Maximum number of characteristic handles kept per discovered service.
pub const MAX_CHARS_PER_SERVICE: usize = 4;

/// Upper bound of a single characteristic read (default ATT MTU - 1).
pub const GATT_READ_MAX: usize = 22;

/// BLE connection interval range (in 1.25 ms units).
/// 80..160 = 100..200 ms; sensors are read once per second, not streamed.
pub const BLE_CONN_INTERVAL_MIN: u16 = 80;
pub const BLE_CONN_INTERVAL_MAX: u16 = 160;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// Sensor poll period (milliseconds).
pub const POLL_INTERVAL_MS: u64 = 1_000;

// I2C target
//
// TWIS pins (nRF52840-DK defaults, selected in `main.rs`):
//
//   I²C SDA        → P0.26
//   I²C SCL        → P0.27

/// Register 0x00: fixed identity/version marker.
pub const REG_IDENTITY: u8 = 0x00;

/// Register 0x01: aggregated readings, computed on each read.
pub const REG_READINGS: u8 = 0x01;

/// Reply of the identity/version register.
pub const IDENTITY_MARKER: &[u8] = &[0x01];

/// Zero-filled reply length for unknown or unselected registers.
pub const UNKNOWN_REGISTER_REPLY_LEN: usize = 5;

/// Largest reply the dynamic register can produce.
pub const MAX_REPLY_LEN: usize = MAX_DEVICES * SensorKind::MAX_ENTRY_LEN;

/// Receive buffer for master writes (register select + handler bytes).
pub const BUS_RX_LEN: usize = 64;

// Build-time selection

/// Default sensor type when `BRIDGE_SENSOR` is not set.
pub const DEFAULT_SENSOR: &str = "Battery";

/// Resolved startup configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Sensor type served by this bridge.
    pub sensor: SensorKind,
    /// I2C target address (derived from the sensor type unless overridden).
    pub i2c_address: u8,
    /// Static address→ID provisioning table.
    pub id_table: IdTable,
}

impl BridgeConfig {
    /// Validate the raw configuration strings.
    ///
    /// `address_override` is a hex 7-bit address such as `"0x21"`.
    pub fn new(
        sensor_name: &str,
        id_table: &str,
        address_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let sensor = SensorKind::from_name(sensor_name)?;
        let id_table = IdTable::parse(id_table)?;
        let i2c_address = match address_override {
            Some(text) => parse_i2c_address(text)?,
            None => sensor.i2c_address(),
        };
        Ok(Self {
            sensor,
            i2c_address,
            id_table,
        })
    }

    /// Configuration baked in at build time via `BRIDGE_SENSOR`,
    /// `BRIDGE_ID_TABLE` and `BRIDGE_I2C_ADDRESS`.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::new(
            option_env!("BRIDGE_SENSOR").unwrap_or(DEFAULT_SENSOR),
            option_env!("BRIDGE_ID_TABLE").unwrap_or(""),
            option_env!("BRIDGE_I2C_ADDRESS"),
        )
    }
}

fn parse_i2c_address(text: &str) -> Result<u8, ConfigError> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    match u8::from_str_radix(digits, 16) {
        Ok(addr) if addr <= 0x7F => Ok(addr),
        _ => Err(ConfigError::InvalidI2cAddress),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_follows_sensor_type() {
        let cfg = BridgeConfig::new("Gyro", "", None).unwrap();
        assert_eq!(cfg.sensor, SensorKind::Gyro);
        assert_eq!(cfg.i2c_address, 0x30);
        assert!(cfg.id_table.is_empty());
    }

    #[test]
    fn address_override_is_hex() {
        let cfg = BridgeConfig::new("Battery", "", Some("0x21")).unwrap();
        assert_eq!(cfg.i2c_address, 0x21);
        let cfg = BridgeConfig::new("Battery", "", Some("1f")).unwrap();
        assert_eq!(cfg.i2c_address, 0x1F);
    }

    #[test]
    fn address_override_rejects_10_bit_and_garbage() {
        assert_eq!(
            BridgeConfig::new("Battery", "", Some("0x80")),
            Err(ConfigError::InvalidI2cAddress)
        );
        assert_eq!(
            BridgeConfig::new("Battery", "", Some("zz")),
            Err(ConfigError::InvalidI2cAddress)
        );
    }

    #[test]
    fn unknown_sensor_is_fatal() {
        assert_eq!(
            BridgeConfig::new("Humidity", "", None),
            Err(ConfigError::UnknownSensorType)
        );
    }

    #[test]
    fn bad_id_table_is_fatal() {
        assert_eq!(
            BridgeConfig::new("Battery", "AA:BB=1", None),
            Err(ConfigError::InvalidIdTable)
        );
    }

    #[test]
    fn default_build_env_is_valid() {
        // Unless overridden by the environment at build time.
        if option_env!("BRIDGE_SENSOR").is_none()
            && option_env!("BRIDGE_ID_TABLE").is_none()
            && option_env!("BRIDGE_I2C_ADDRESS").is_none()
        {
            let cfg = BridgeConfig::from_build_env().unwrap();
            assert_eq!(cfg.sensor, SensorKind::Battery);
            assert_eq!(cfg.i2c_address, 0x10);
        }
    }
}
