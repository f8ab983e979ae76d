//! micro:bit GATT facades
//!
//! Maps the declared profile (`microbit_proto::PROFILE`) onto live GATT
//! objects and exposes read, write and notify uniformly for binary and text
//! payloads.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use microbit_gatt::{Bluetooth, GattServerFacade, RequestDeviceOptions, ble};
//! use microbit_proto::{PROFILE, profile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bluetooth = ble::BtleplugBluetooth::new(Duration::from_secs(5));
//!     let options = RequestDeviceOptions {
//!         name_prefix: "BBC micro:bit".to_string(),
//!         optional_services: microbit_gatt::profile_services(PROFILE)?,
//!     };
//!     let link = bluetooth.request_device(&options).await?;
//!     let server = GattServerFacade::resolve(link, PROFILE).await?;
//!
//!     let model = server.characteristic_by_str(profile::MODEL_NUMBER_STRING).unwrap();
//!     println!("{}", model.read_text().await?);
//!
//!     server.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
mod characteristic;
mod error;
mod link;
pub mod mock;
mod server;
mod service;

pub use characteristic::{CharacteristicHandle, Subscription};
pub use error::GattError;
pub use link::{
    Bluetooth, CharacteristicProperties, GattLink, Notification, RemoteCharacteristic,
    RemoteService, RequestDeviceOptions,
};
pub use server::{FacadeIndex, GattServerFacade, Location};
pub use service::ServiceHandle;

/// Service UUIDs of `profile`, for [`RequestDeviceOptions::optional_services`]
pub fn profile_services(
    profile: &[microbit_proto::ServiceDescriptor],
) -> Result<Vec<uuid::Uuid>, GattError> {
    microbit_proto::service_uuids(profile)
        .into_iter()
        .map(|s| Ok(uuid::Uuid::parse_str(s)?))
        .collect()
}
