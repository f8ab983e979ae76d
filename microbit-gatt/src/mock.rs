//! In-memory micro:bit for tests and offline demos

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, BoxStream, StreamExt};
use microbit_proto::{MAX_PDU, profile};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::link::{
    Bluetooth, CharacteristicProperties, GattLink, Notification, RemoteCharacteristic,
    RemoteService, RequestDeviceOptions,
};
use crate::GattError;

const fn props(read: bool, write: bool, notify: bool, indicate: bool) -> CharacteristicProperties {
    CharacteristicProperties { read, write, write_without_response: write, notify, indicate }
}

const READ: CharacteristicProperties = props(true, false, false, false);
const NOTIFY: CharacteristicProperties = props(true, false, true, false);
const WRITE: CharacteristicProperties = props(false, true, false, false);
const READ_WRITE: CharacteristicProperties = props(true, true, false, false);
const INDICATE: CharacteristicProperties = props(false, false, false, true);

#[derive(Debug, Clone)]
struct MockCharacteristic {
    properties: CharacteristicProperties,
    value: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    services: BTreeMap<Uuid, BTreeMap<Uuid, MockCharacteristic>>,
    allowed: Option<Vec<Uuid>>,
    subscribed: HashSet<Uuid>,
    writes: Vec<(Uuid, Vec<u8>)>,
    reads: Vec<Uuid>,
    failing: HashSet<Uuid>,
    connected: bool,
    stuck: bool,
}

/// A scripted peripheral. Clones share state.
#[derive(Clone)]
pub struct MockPeripheral {
    name: String,
    state: Arc<Mutex<State>>,
    notify_tx: broadcast::Sender<Notification>,
}

fn parse(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_default()
}

impl MockPeripheral {
    pub fn new(name: &str) -> Self {
        let (notify_tx, _) = broadcast::channel(64);
        let state = State { connected: true, ..State::default() };
        Self { name: name.to_string(), state: Arc::new(Mutex::new(state)), notify_tx }
    }

    /// A micro:bit with every service of the profile and canned values
    pub fn microbit() -> Self {
        use profile::*;

        let mock = Self::new("BBC micro:bit [zogav]");
        let characteristics: [(&str, &str, CharacteristicProperties, &[u8]); 10] = [
            (DEVICE_INFORMATION, MODEL_NUMBER_STRING, READ, b"BBC micro:bit V2.0"),
            (DEVICE_INFORMATION, SERIAL_NUMBER_STRING, READ, b"1234567890"),
            (DEVICE_INFORMATION, FIRMWARE_REVISION_STRING, READ, b"2.1.1"),
            (BUTTON_SERVICE, BUTTON_A_STATE, NOTIFY, &[0]),
            (BUTTON_SERVICE, BUTTON_B_STATE, NOTIFY, &[0]),
            (LED_SERVICE, LED_MATRIX_STATE, READ_WRITE, &[0; 5]),
            (LED_SERVICE, LED_TEXT, WRITE, b""),
            (LED_SERVICE, SCROLLING_DELAY, READ_WRITE, &[0x78, 0x00]),
            (UART_SERVICE, UART_REQUEST, WRITE, b""),
            (UART_SERVICE, UART_RESPONSE, INDICATE, b""),
        ];
        for (service, characteristic, properties, value) in characteristics {
            mock.add_characteristic(service, characteristic, properties, value);
        }
        mock
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_characteristic(
        &self,
        service: &str,
        characteristic: &str,
        properties: CharacteristicProperties,
        value: &[u8],
    ) {
        let stored = MockCharacteristic { properties, value: value.to_vec() };
        self.state()
            .services
            .entry(parse(service))
            .or_default()
            .insert(parse(characteristic), stored);
    }

    pub fn remove_service(&self, service: &str) {
        self.state().services.remove(&parse(service));
    }

    /// Replace the stored value without notifying
    pub fn set_value(&self, characteristic: &str, value: &[u8]) {
        let c = parse(characteristic);
        for chars in self.state().services.values_mut() {
            if let Some(ch) = chars.get_mut(&c) {
                ch.value = value.to_vec();
            }
        }
    }

    pub fn value(&self, characteristic: &str) -> Option<Vec<u8>> {
        let c = parse(characteristic);
        self.state().services.values().find_map(|chars| chars.get(&c).map(|ch| ch.value.clone()))
    }

    /// Push a notification. Returns false if nobody enabled notifications.
    pub fn notify(&self, characteristic: &str, value: &[u8]) -> bool {
        let c = parse(characteristic);
        if !self.state().subscribed.contains(&c) {
            return false;
        }
        self.set_value(characteristic, value);
        self.notify_tx.send(Notification { uuid: c, value: value.to_vec() }).is_ok()
    }

    pub fn is_subscribed(&self, characteristic: &str) -> bool {
        self.state().subscribed.contains(&parse(characteristic))
    }

    /// Every write so far, in order
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state().writes.clone()
    }

    pub fn writes_to(&self, characteristic: &str) -> Vec<Vec<u8>> {
        let c = parse(characteristic);
        self.state().writes.iter().filter(|(u, _)| *u == c).map(|(_, v)| v.clone()).collect()
    }

    pub fn read_count(&self, characteristic: &str) -> usize {
        let c = parse(characteristic);
        self.state().reads.iter().filter(|u| **u == c).count()
    }

    /// Make every read and write of `characteristic` fail
    pub fn fail(&self, characteristic: &str) {
        self.state().failing.insert(parse(characteristic));
    }

    /// Keep reporting connected after a disconnect request
    pub fn stick_connection(&self) {
        self.state().stuck = true;
    }

    pub fn drop_connection(&self) {
        self.state().connected = false;
    }

    fn allow(&self, services: Vec<Uuid>) {
        let mut state = self.state();
        state.allowed = Some(services);
        state.connected = true;
    }

    fn check(&self, c: &RemoteCharacteristic) -> Result<MockCharacteristic, GattError> {
        let state = self.state();
        if !state.connected {
            return Err(GattError::NotConnected);
        }
        if state.failing.contains(&c.uuid) {
            return Err(GattError::Platform(format!("GATT operation failed on {}", c.uuid)));
        }
        state
            .services
            .get(&c.service_uuid)
            .and_then(|chars| chars.get(&c.uuid))
            .cloned()
            .ok_or(GattError::CharacteristicNotFound {
                service: c.service_uuid,
                characteristic: c.uuid,
            })
    }
}

#[async_trait::async_trait]
impl GattLink for MockPeripheral {
    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<RemoteService, GattError> {
        let state = self.state();
        if !state.connected {
            return Err(GattError::NotConnected);
        }
        if state.allowed.as_ref().is_some_and(|a| !a.contains(&uuid)) {
            return Err(GattError::ServiceNotAllowed(uuid));
        }
        if !state.services.contains_key(&uuid) {
            return Err(GattError::ServiceNotFound(uuid));
        }
        Ok(RemoteService { uuid })
    }

    async fn characteristic(
        &self,
        service: &RemoteService,
        uuid: Uuid,
    ) -> Result<RemoteCharacteristic, GattError> {
        let state = self.state();
        state
            .services
            .get(&service.uuid)
            .and_then(|chars| chars.get(&uuid))
            .map(|c| RemoteCharacteristic {
                uuid,
                service_uuid: service.uuid,
                properties: c.properties,
            })
            .ok_or(GattError::CharacteristicNotFound {
                service: service.uuid,
                characteristic: uuid,
            })
    }

    async fn read(&self, c: &RemoteCharacteristic) -> Result<Vec<u8>, GattError> {
        let ch = self.check(c)?;
        if !ch.properties.read {
            return Err(GattError::Platform("GATT operation not permitted".to_string()));
        }
        self.state().reads.push(c.uuid);
        Ok(ch.value)
    }

    async fn write(&self, c: &RemoteCharacteristic, value: &[u8]) -> Result<(), GattError> {
        let ch = self.check(c)?;
        if !(ch.properties.write || ch.properties.write_without_response) {
            return Err(GattError::Platform("GATT operation not permitted".to_string()));
        }
        if value.len() > MAX_PDU {
            return Err(GattError::Platform(format!(
                "value of {} bytes exceeds the {MAX_PDU} byte limit",
                value.len()
            )));
        }
        let mut state = self.state();
        state.writes.push((c.uuid, value.to_vec()));
        let stored = state
            .services
            .get_mut(&c.service_uuid)
            .and_then(|s| s.get_mut(&c.uuid));
        if let Some(stored) = stored {
            stored.value = value.to_vec();
        }
        Ok(())
    }

    async fn subscribe(&self, c: &RemoteCharacteristic) -> Result<(), GattError> {
        let ch = self.check(c)?;
        if !(ch.properties.notify || ch.properties.indicate) {
            return Err(GattError::Platform("GATT operation not permitted".to_string()));
        }
        self.state().subscribed.insert(c.uuid);
        Ok(())
    }

    async fn unsubscribe(&self, c: &RemoteCharacteristic) -> Result<(), GattError> {
        self.state().subscribed.remove(&c.uuid);
        Ok(())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, GattError> {
        let rx = self.notify_tx.subscribe();
        Ok(stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(n) => return Some((n, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }

    async fn is_connected(&self) -> Result<bool, GattError> {
        Ok(self.state().connected)
    }

    async fn disconnect(&self) -> Result<(), GattError> {
        let mut state = self.state();
        if !state.stuck {
            state.connected = false;
            state.subscribed.clear();
        }
        Ok(())
    }
}

/// Host stack offering at most one [`MockPeripheral`]
#[derive(Clone, Default)]
pub struct MockBluetooth {
    unavailable: bool,
    device: Option<MockPeripheral>,
    requests: Arc<Mutex<Vec<RequestDeviceOptions>>>,
}

impl MockBluetooth {
    pub fn with_device(device: MockPeripheral) -> Self {
        Self { device: Some(device), ..Self::default() }
    }

    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    /// Options of every `request_device` call so far
    pub fn requests(&self) -> Vec<RequestDeviceOptions> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Bluetooth for MockBluetooth {
    async fn is_available(&self) -> bool {
        !self.unavailable
    }

    async fn request_device(
        &self,
        options: &RequestDeviceOptions,
    ) -> Result<Arc<dyn GattLink>, GattError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(options.clone());
        }
        match &self.device {
            Some(device) if device.name.starts_with(&options.name_prefix) => {
                device.allow(options.optional_services.clone());
                Ok(Arc::new(device.clone()))
            }
            _ => Err(GattError::NoDevice(options.name_prefix.clone())),
        }
    }
}
