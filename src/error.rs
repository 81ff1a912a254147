//! Unified error type for the bridge.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// A radio-side operation failed.
    Ble(BleError),

    // I2C target
    /// The bus peripheral reported a failed wait or reply.
    Bus(BusError),

    // Startup
    /// Invalid build/run-time configuration. Fatal before steady state.
    Config(ConfigError),

    // Bookkeeping
    /// The device directory has no free slot.
    DirectoryFull,

    /// The address is already present in the device directory.
    AlreadyKnown,

    /// The address is not present in the device directory.
    UnknownDevice,

    /// The readings cache has no free slot.
    CacheFull,
}

/// Radio errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// Scan was cancelled or could not start (e.g. adapter not enabled).
    ScanFailed,
    /// Connection attempt failed.
    ConnectFailed,
    /// Identity service or characteristic not found.
    IdentityNotFound,
    /// Sensor service or characteristic not found.
    SensorServiceNotFound,
    /// GATT discovery failed at the transport level.
    DiscoveryFailed,
    /// Characteristic read failed.
    ReadFailed,
    /// Link dropped by the peer or supervision timeout.
    Disconnected,
}

/// I2C target (TWIS) errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// Waiting for the next bus event failed.
    Listen,
    /// Handing the reply to the driver failed.
    Reply,
    /// The master wrote more bytes than the receive buffer holds.
    Overflow,
}

/// Configuration errors detected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Sensor type name is not one of Battery / Temperature / Gyro.
    UnknownSensorType,
    /// Address→ID table entry could not be parsed.
    InvalidIdTable,
    /// The same address appears twice in the address→ID table.
    DuplicateId,
    /// Address→ID table has more entries than it can hold.
    IdTableFull,
    /// I2C target address override is not a valid 7-bit address.
    InvalidI2cAddress,
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Error::Bus(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}
