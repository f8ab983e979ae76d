//! btleplug backend
//!
//! Scans for a device by name prefix, connects, and exposes the connection
//! as a [`GattLink`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{
    CharPropFlags, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::link::{
    Bluetooth, CharacteristicProperties, GattLink, Notification, RemoteCharacteristic,
    RemoteService, RequestDeviceOptions,
};
use crate::GattError;

/// A device seen during a scan
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_microbit: bool,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, GattError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(GattError::Unavailable)
}

/// Scan for BLE devices
///
/// Returns every device seen. Devices whose name starts with `name_prefix`
/// have `is_microbit = true`.
pub async fn scan(
    name_prefix: &str,
    duration: Duration,
) -> Result<Vec<DiscoveredDevice>, GattError> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string();
            let is_microbit = name.starts_with(name_prefix);

            devices.push(DiscoveredDevice { name, address, rssi: props.rssi, is_microbit });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find the first device whose advertised name starts with `name_prefix`
async fn find_device(
    adapter: &Adapter,
    name_prefix: &str,
    duration: Duration,
) -> Result<(Peripheral, String), GattError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            if name.starts_with(name_prefix) {
                adapter.stop_scan().await?;
                return Ok((peripheral, name));
            }
        }
    }

    adapter.stop_scan().await?;
    Err(GattError::NoDevice(name_prefix.to_string()))
}

/// Host Bluetooth through btleplug. There is no chooser dialog: the first
/// matching device seen within the scan window is taken.
#[derive(Debug, Clone)]
pub struct BtleplugBluetooth {
    scan_duration: Duration,
}

impl BtleplugBluetooth {
    pub fn new(scan_duration: Duration) -> Self {
        Self { scan_duration }
    }
}

#[async_trait::async_trait]
impl Bluetooth for BtleplugBluetooth {
    async fn is_available(&self) -> bool {
        match get_adapter().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("no usable Bluetooth adapter: {e}");
                false
            }
        }
    }

    async fn request_device(
        &self,
        options: &RequestDeviceOptions,
    ) -> Result<Arc<dyn GattLink>, GattError> {
        let adapter = get_adapter().await?;
        tracing::info!(prefix = %options.name_prefix, "scanning");
        let (peripheral, name) =
            find_device(&adapter, &options.name_prefix, self.scan_duration).await?;

        tracing::info!(%name, address = %peripheral.address(), "connecting");
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let services = peripheral.services();
        Ok(Arc::new(BtleplugLink {
            peripheral,
            name,
            allowed: options.optional_services.clone(),
            services,
        }))
    }
}

/// A connected btleplug peripheral
pub struct BtleplugLink {
    peripheral: Peripheral,
    name: String,
    allowed: Vec<Uuid>,
    services: BTreeSet<Service>,
}

impl BtleplugLink {
    fn find(&self, c: &RemoteCharacteristic) -> Result<Characteristic, GattError> {
        self.services
            .iter()
            .filter(|s| s.uuid == c.service_uuid)
            .flat_map(|s| s.characteristics.iter())
            .find(|ch| ch.uuid == c.uuid)
            .cloned()
            .ok_or(GattError::CharacteristicNotFound {
                service: c.service_uuid,
                characteristic: c.uuid,
            })
    }
}

fn properties(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

#[async_trait::async_trait]
impl GattLink for BtleplugLink {
    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<RemoteService, GattError> {
        if !self.allowed.contains(&uuid) {
            return Err(GattError::ServiceNotAllowed(uuid));
        }
        self.services
            .iter()
            .find(|s| s.uuid == uuid && s.primary)
            .map(|s| RemoteService { uuid: s.uuid })
            .ok_or(GattError::ServiceNotFound(uuid))
    }

    async fn characteristic(
        &self,
        service: &RemoteService,
        uuid: Uuid,
    ) -> Result<RemoteCharacteristic, GattError> {
        self.services
            .iter()
            .filter(|s| s.uuid == service.uuid)
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
            .map(|c| RemoteCharacteristic {
                uuid: c.uuid,
                service_uuid: c.service_uuid,
                properties: properties(c.properties),
            })
            .ok_or(GattError::CharacteristicNotFound {
                service: service.uuid,
                characteristic: uuid,
            })
    }

    async fn read(&self, c: &RemoteCharacteristic) -> Result<Vec<u8>, GattError> {
        let ch = self.find(c)?;
        Ok(self.peripheral.read(&ch).await?)
    }

    async fn write(&self, c: &RemoteCharacteristic, value: &[u8]) -> Result<(), GattError> {
        let ch = self.find(c)?;
        // prefer acknowledged writes, as a browser would
        let write_type = if ch.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        Ok(self.peripheral.write(&ch, value, write_type).await?)
    }

    async fn subscribe(&self, c: &RemoteCharacteristic) -> Result<(), GattError> {
        let ch = self.find(c)?;
        Ok(self.peripheral.subscribe(&ch).await?)
    }

    async fn unsubscribe(&self, c: &RemoteCharacteristic) -> Result<(), GattError> {
        let ch = self.find(c)?;
        Ok(self.peripheral.unsubscribe(&ch).await?)
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, GattError> {
        let stream = self.peripheral.notifications().await?;
        Ok(stream
            .map(|n| Notification { uuid: n.uuid, value: n.value })
            .boxed())
    }

    async fn is_connected(&self) -> Result<bool, GattError> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn disconnect(&self) -> Result<(), GattError> {
        tracing::info!(name = %self.name, "disconnecting");
        Ok(self.peripheral.disconnect().await?)
    }
}
