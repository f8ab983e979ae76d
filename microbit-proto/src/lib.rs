//! micro:bit Bluetooth profile - UUIDs and payload encodings
//!
//! See also:
//! - micro:bit Bluetooth profile:
//!   https://lancaster-university.github.io/microbit-docs/ble/profile/

pub mod codec;
pub mod profile;

pub use codec::{
    Button, ButtonState, GlyphError, LedMatrix, MAX_PDU, button_label, parse_scrolling_delay,
    scroll_duration, scrolling_delay_bytes, uart_request_payload,
};
pub use profile::{
    BLOCKLIST, DEVICE_NAME_PREFIX, PROFILE, ServiceDescriptor, characteristic_uuids,
    is_blocklisted, parse_uuid, service_uuids,
};
