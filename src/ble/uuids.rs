//! BLE Service, Characteristic and Descriptor UUIDs.
//!
//! Contains the wire-level constants used for SeatMonitor communication.

use std::time::Duration;
use uuid::Uuid;

// Seat Monitor Service (custom)
/// SeatMonitor service UUID.
pub const SEAT_SERVICE_UUID: Uuid = Uuid::from_u128(0x19b1_0010_e8f2_537e_4f6c_d104768a1214);
/// Seat state characteristic UUID (Read, Notify).
pub const SEAT_STATE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x19b1_0012_e8f2_537e_4f6c_d104768a1214);

// Standard BLE descriptors
/// Client Characteristic Configuration Descriptor UUID.
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// Value written to the CCCD to enable notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Advertised local name of the seat sensor.
pub const SEAT_MONITOR_NAME: &str = "SeatMonitor";

/// Default length of a discovery window.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_millis(30_000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            SEAT_SERVICE_UUID.to_string(),
            "19b10010-e8f2-537e-4f6c-d104768a1214"
        );
        assert_eq!(
            SEAT_STATE_CHARACTERISTIC_UUID.to_string(),
            "19b10012-e8f2-537e-4f6c-d104768a1214"
        );
        assert_eq!(
            CLIENT_CHARACTERISTIC_CONFIG_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_scan_window() {
        assert_eq!(DEFAULT_SCAN_WINDOW.as_millis(), 30_000);
    }
}
