//! Sensor kinds served by the bridge.
//!
//! The kind is picked once at startup and carries everything that depends
//! on it: GATT UUIDs, payload size, I2C entry layout and bus address.
//!
//! Dynamic-register entry layout:
//! ```text
//! Battery     : [is_new:1][id:1][millivolts:2]        = 4 bytes
//! Temperature : [is_new:1][celsius:2]                 = 3 bytes
//! Gyro        : [is_new:1][accel xyz + gyro xyz:18]   = 19 bytes
//! ```

use crate::error::ConfigError;

/// Identity service and characteristic (single byte node ID).
pub const IDENTITY_UUID16: u16 = 0x2C05;

/// Tail of the Bluetooth base UUID `0000xxxx-0000-1000-8000-00805F9B34FB`.
const BASE_UUID_TAIL: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
];

/// Sensor type exposed by this bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorKind {
    /// Battery voltage node (2-byte millivolt reading).
    Battery,
    /// Temperature node (2-byte signed whole degrees).
    Temperature,
    /// MPU-6050 node (accelerometer + gyroscope sample, 18 bytes).
    Gyro,
}

impl SensorKind {
    /// Every supported kind.
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Battery,
        SensorKind::Temperature,
        SensorKind::Gyro,
    ];

    /// Largest payload across all kinds.
    pub const MAX_PAYLOAD_LEN: usize = 18;

    /// Largest dynamic-register entry across all kinds.
    pub const MAX_ENTRY_LEN: usize = 19;

    /// Parse a sensor type name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
            .ok_or(ConfigError::UnknownSensorType)
    }

    /// Canonical name, also the key of the sensor service handles.
    pub const fn name(self) -> &'static str {
        match self {
            SensorKind::Battery => "Battery",
            SensorKind::Temperature => "Temperature",
            SensorKind::Gyro => "Gyro",
        }
    }

    /// 16-bit UUID of the sensor service and of its characteristic.
    pub const fn service_uuid16(self) -> u16 {
        match self {
            SensorKind::Battery => 0x2B18,
            SensorKind::Temperature => 0x2A6E,
            SensorKind::Gyro => 0x2F01,
        }
    }

    /// 128-bit advertisement signature, in the byte order sensor nodes put
    /// it in their advertising payload.
    pub const fn advertised_uuid(self) -> [u8; 16] {
        let [hi, lo] = self.service_uuid16().to_be_bytes();
        let t = BASE_UUID_TAIL;
        [
            0x00, 0x00, hi, lo, t[0], t[1], t[2], t[3], t[4], t[5], t[6], t[7], t[8], t[9],
            t[10], t[11],
        ]
    }

    /// Expected length of one characteristic read.
    pub const fn payload_len(self) -> usize {
        match self {
            SensorKind::Battery => 2,
            SensorKind::Temperature => 2,
            SensorKind::Gyro => 18,
        }
    }

    /// Whether dynamic-register entries carry the node ID byte.
    pub const fn has_id_byte(self) -> bool {
        matches!(self, SensorKind::Battery)
    }

    /// Length of one dynamic-register entry.
    pub const fn entry_len(self) -> usize {
        1 + self.has_id_byte() as usize + self.payload_len()
    }

    /// I2C target address for this kind.
    pub const fn i2c_address(self) -> u8 {
        match self {
            SensorKind::Battery => 0x10,
            SensorKind::Temperature => 0x20,
            SensorKind::Gyro => 0x30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(SensorKind::from_name("Battery"), Ok(SensorKind::Battery));
        assert_eq!(SensorKind::from_name("temperature"), Ok(SensorKind::Temperature));
        assert_eq!(SensorKind::from_name(" GYRO "), Ok(SensorKind::Gyro));
    }

    #[test]
    fn unknown_and_null_names_rejected() {
        assert_eq!(
            SensorKind::from_name("null"),
            Err(ConfigError::UnknownSensorType)
        );
        assert_eq!(SensorKind::from_name(""), Err(ConfigError::UnknownSensorType));
    }

    #[test]
    fn entry_lengths() {
        assert_eq!(SensorKind::Battery.entry_len(), 4);
        assert_eq!(SensorKind::Temperature.entry_len(), 3);
        assert_eq!(SensorKind::Gyro.entry_len(), 19);
        for kind in SensorKind::ALL {
            assert!(kind.payload_len() <= SensorKind::MAX_PAYLOAD_LEN);
            assert!(kind.entry_len() <= SensorKind::MAX_ENTRY_LEN);
        }
    }

    #[test]
    fn battery_signature_matches_node_firmware() {
        assert_eq!(
            SensorKind::Battery.advertised_uuid(),
            [
                0x00, 0x00, 0x2B, 0x18, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F,
                0x9B, 0x34, 0xFB,
            ]
        );
    }

    #[test]
    fn signatures_differ_per_kind() {
        let b = SensorKind::Battery.advertised_uuid();
        let t = SensorKind::Temperature.advertised_uuid();
        let g = SensorKind::Gyro.advertised_uuid();
        assert_ne!(b, t);
        assert_ne!(t, g);
        assert_eq!(&t[2..4], &[0x2A, 0x6E]);
        assert_eq!(&g[2..4], &[0x2F, 0x01]);
    }

    #[test]
    fn bus_addresses() {
        assert_eq!(SensorKind::Battery.i2c_address(), 0x10);
        assert_eq!(SensorKind::Temperature.i2c_address(), 0x20);
        assert_eq!(SensorKind::Gyro.i2c_address(), 0x30);
    }
}
