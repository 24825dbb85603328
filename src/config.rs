//! Application-wide constants and construction-time configuration.
//!
//! All protocol constants, timing parameters and table capacities live
//! here so they can be tuned in one place.

use crate::ble::matcher::DeviceMatcher;
use crate::ble::{Address, Uuid16};

// GATT

/// HID-over-GATT service.
pub const HID_SERVICE_UUID: Uuid16 = Uuid16(0x1812);

/// Battery service.
pub const BATTERY_SERVICE_UUID: Uuid16 = Uuid16(0x180F);

/// HID Report characteristic.
pub const HID_REPORT_CHAR_UUID: Uuid16 = Uuid16(0x2A4D);

/// Battery Level characteristic.
pub const BATTERY_LEVEL_CHAR_UUID: Uuid16 = Uuid16(0x2A19);

/// The only services enumerated after connecting.
pub const KNOWN_SERVICES: [Uuid16; 2] = [HID_SERVICE_UUID, BATTERY_SERVICE_UUID];

// Advertisement fingerprint

/// GAP appearance "HID Gamepad" (0x03C4).
pub const CONTROLLER_APPEARANCE: u16 = 964;

/// Manufacturer data while the controller advertises to its known host.
pub const MANUFACTURER_DATA_IDLE: &[u8] = &[0x06, 0x00, 0x00];

/// Manufacturer data while the pair button is held.
pub const MANUFACTURER_DATA_PAIRING: &[u8] = &[0x06, 0x00, 0x03, 0x00, 0x80];

// Scan / connect

/// Duration of a BLE scan window (seconds). 0 scans until a match.
pub const BLE_SCAN_DURATION_SECS: u32 = 4;

/// Connect attempts per candidate before the bond is dropped.
pub const BLE_CONNECT_ATTEMPTS: u8 = 3;

/// Delay between two connect attempts (ms).
pub const BLE_RETRY_INTERVAL_MS: u32 = 100;

/// BLE connection interval range (in 1.25 ms units).
/// 6 = 7.5 ms (lowest latency for HID).
pub const BLE_CONN_INTERVAL_MIN: u16 = 6;
pub const BLE_CONN_INTERVAL_MAX: u16 = 12;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

// Capacities

/// Services returned by one discovery pass.
pub const MAX_SERVICES: usize = 2;

/// Characteristics tracked per service.
pub const MAX_CHARACTERISTICS: usize = 12;

/// Largest characteristic value we read back.
pub const MAX_VALUE_LEN: usize = 64;

/// Largest advertisement payload (legacy advertising).
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Construction-time settings for one controller instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    /// Connect to exactly this address; `None` falls back to the
    /// advertisement fingerprint.
    pub target: Option<Address>,
    /// Scan window in seconds, 0 = unbounded.
    pub scan_duration_secs: u32,
    /// Connect attempts per candidate.
    pub connect_attempts: u8,
    /// Delay between attempts in milliseconds.
    pub retry_interval_ms: u32,
}

impl ControllerConfig {
    pub const fn new() -> Self {
        Self {
            target: None,
            scan_duration_secs: BLE_SCAN_DURATION_SECS,
            connect_attempts: BLE_CONNECT_ATTEMPTS,
            retry_interval_ms: BLE_RETRY_INTERVAL_MS,
        }
    }

    /// Same defaults, pinned to one peer.
    pub const fn with_target(target: Address) -> Self {
        let mut config = Self::new();
        config.target = Some(target);
        config
    }

    pub const fn matcher(&self) -> DeviceMatcher {
        DeviceMatcher::new(self.target)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}
