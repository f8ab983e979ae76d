//! Platform seam: device selection and one live GATT connection
//!
//! The btleplug backend lives in [`crate::ble`], the in-memory one in
//! [`crate::mock`].

use std::sync::Arc;

use futures::stream::BoxStream;
use uuid::Uuid;

use crate::GattError;

/// Options for the device chooser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDeviceOptions {
    /// Only devices whose advertised name starts with this are offered
    pub name_prefix: String,
    /// Services the application may access once connected. The platform
    /// refuses access to any other service.
    pub optional_services: Vec<Uuid>,
}

/// A primary service found on the remote GATT server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteService {
    pub uuid: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

/// A characteristic found under a [`RemoteService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
}

/// A value pushed by the peripheral after subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

/// Host Bluetooth stack
#[async_trait::async_trait]
pub trait Bluetooth: Send + Sync {
    /// Whether the host has a usable Bluetooth adapter at all
    async fn is_available(&self) -> bool;

    /// Select a device matching `options` and connect its GATT server
    async fn request_device(
        &self,
        options: &RequestDeviceOptions,
    ) -> Result<Arc<dyn GattLink>, GattError>;
}

/// One live GATT server connection
#[async_trait::async_trait]
pub trait GattLink: Send + Sync {
    /// Advertised name of the connected device, if known
    fn name(&self) -> Option<String>;

    async fn primary_service(&self, uuid: Uuid) -> Result<RemoteService, GattError>;

    async fn characteristic(
        &self,
        service: &RemoteService,
        uuid: Uuid,
    ) -> Result<RemoteCharacteristic, GattError>;

    async fn read(&self, characteristic: &RemoteCharacteristic) -> Result<Vec<u8>, GattError>;

    async fn write(
        &self,
        characteristic: &RemoteCharacteristic,
        value: &[u8],
    ) -> Result<(), GattError>;

    /// Enable notifications (or indications) on the characteristic
    async fn subscribe(&self, characteristic: &RemoteCharacteristic) -> Result<(), GattError>;

    async fn unsubscribe(&self, characteristic: &RemoteCharacteristic) -> Result<(), GattError>;

    /// Stream of notifications from every subscribed characteristic
    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, GattError>;

    async fn is_connected(&self) -> Result<bool, GattError>;

    async fn disconnect(&self) -> Result<(), GattError>;
}
