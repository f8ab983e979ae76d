//! GATT profile of the micro:bit firmware
//!
//! Changing the firmware profile means editing this table only. Two parallel
//! sequences are derived from [`PROFILE`]: the service UUIDs to discover, and,
//! index-aligned, the characteristic UUIDs to resolve under each service.

use uuid::Uuid;

/// Advertised name prefix, e.g. `BBC micro:bit [vagip]`
pub const DEVICE_NAME_PREFIX: &str = "BBC micro:bit";

// ------------------------------------------------------------
// Device Information (Bluetooth SIG assigned)
// ------------------------------------------------------------

/// Device Information Service: 0x180A
pub const DEVICE_INFORMATION: &str = "0000180a-0000-1000-8000-00805f9b34fb";

/// Model Number String (read, utf8s)
pub const MODEL_NUMBER_STRING: &str = "00002a24-0000-1000-8000-00805f9b34fb";

/// Serial Number String. Blocklisted by host platforms, never request it.
pub const SERIAL_NUMBER_STRING: &str = "00002a25-0000-1000-8000-00805f9b34fb";

/// Firmware Revision String (read, utf8s)
pub const FIRMWARE_REVISION_STRING: &str = "00002a26-0000-1000-8000-00805f9b34fb";

// ------------------------------------------------------------
// Button Service
// ------------------------------------------------------------

/// Button Service
pub const BUTTON_SERVICE: &str = "e95d9882-251d-470a-a062-fa1922dfa9a8";

/// Button A State (read/notify, uint8: 0 = not pressed, 1 = pressed, 2 = long press)
pub const BUTTON_A_STATE: &str = "e95dda90-251d-470a-a062-fa1922dfa9a8";

/// Button B State (read/notify, uint8)
pub const BUTTON_B_STATE: &str = "e95dda91-251d-470a-a062-fa1922dfa9a8";

// ------------------------------------------------------------
// LED Service
// ------------------------------------------------------------

/// LED Service
pub const LED_SERVICE: &str = "e95dd91d-251d-470a-a062-fa1922dfa9a8";

/// LED Matrix State (read/write, 5 octets, one per row, bit 4 = leftmost LED)
pub const LED_MATRIX_STATE: &str = "e95d7b77-251d-470a-a062-fa1922dfa9a8";

/// LED Text (write, utf8s, at most 20 octets)
pub const LED_TEXT: &str = "e95d93ee-251d-470a-a062-fa1922dfa9a8";

/// Scrolling Delay (write, uint16 little-endian, milliseconds per character step)
pub const SCROLLING_DELAY: &str = "e95d0d2d-251d-470a-a062-fa1922dfa9a8";

// ------------------------------------------------------------
// UART Service
// ------------------------------------------------------------

/// UART Service (Nordic UART compatible)
pub const UART_SERVICE: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Request channel, written by the client.
///
/// The firmware calls this the RX characteristic since it receives on it.
pub const UART_REQUEST: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Response channel, pushed by the device (notify/indicate).
///
/// The firmware calls this the TX characteristic.
pub const UART_RESPONSE: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// Characteristics refused by host platform security policy
pub const BLOCKLIST: &[&str] = &[SERIAL_NUMBER_STRING];

/// A service and the characteristics the application touches under it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service: &'static str,
    pub characteristics: &'static [&'static str],
}

/// Ordered profile table. Resolution follows this order.
pub const PROFILE: &[ServiceDescriptor] = &[
    ServiceDescriptor {
        service: DEVICE_INFORMATION,
        characteristics: &[MODEL_NUMBER_STRING, FIRMWARE_REVISION_STRING],
    },
    ServiceDescriptor {
        service: BUTTON_SERVICE,
        characteristics: &[BUTTON_A_STATE, BUTTON_B_STATE],
    },
    ServiceDescriptor {
        service: LED_SERVICE,
        characteristics: &[LED_MATRIX_STATE, LED_TEXT, SCROLLING_DELAY],
    },
    ServiceDescriptor {
        service: UART_SERVICE,
        characteristics: &[UART_REQUEST, UART_RESPONSE],
    },
];

/// Service UUIDs, in profile order
pub fn service_uuids(profile: &[ServiceDescriptor]) -> Vec<&'static str> {
    profile.iter().map(|d| d.service).collect()
}

/// Characteristic UUID lists, index-aligned with [`service_uuids`]
pub fn characteristic_uuids(profile: &[ServiceDescriptor]) -> Vec<&'static [&'static str]> {
    profile.iter().map(|d| d.characteristics).collect()
}

pub fn is_blocklisted(uuid: &Uuid) -> bool {
    BLOCKLIST.iter().any(|b| Uuid::parse_str(b).is_ok_and(|b| b == *uuid))
}

/// Parse a registry UUID string
pub fn parse_uuid(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_uuid_parses_in_canonical_form() {
        for d in PROFILE {
            for s in std::iter::once(&d.service).chain(d.characteristics) {
                let uuid = parse_uuid(s).unwrap();
                assert_eq!(uuid.hyphenated().to_string(), *s);
            }
        }
    }

    #[test]
    fn derived_lists_are_parallel() {
        let services = service_uuids(PROFILE);
        let characteristics = characteristic_uuids(PROFILE);
        assert_eq!(services.len(), characteristics.len());
        assert_eq!(services[2], LED_SERVICE);
        assert_eq!(characteristics[2], &[LED_MATRIX_STATE, LED_TEXT, SCROLLING_DELAY]);
    }

    #[test]
    fn no_duplicate_uuids() {
        let mut seen = HashSet::new();
        for d in PROFILE {
            assert!(seen.insert(d.service), "duplicate {}", d.service);
            for c in d.characteristics {
                assert!(seen.insert(*c), "duplicate {c}");
            }
        }
    }

    #[test]
    fn serial_number_is_never_requested() {
        let serial = parse_uuid(SERIAL_NUMBER_STRING).unwrap();
        assert!(is_blocklisted(&serial));
        for d in PROFILE {
            for c in d.characteristics {
                assert!(!is_blocklisted(&parse_uuid(c).unwrap()));
            }
        }
    }

    #[test]
    fn vendor_characteristics_share_the_micro_bit_base() {
        let base = "-251d-470a-a062-fa1922dfa9a8";
        for d in &PROFILE[1..3] {
            assert!(d.service.ends_with(base));
            assert!(d.characteristics.iter().all(|c| c.ends_with(base)));
        }
    }
}
