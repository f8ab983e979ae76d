use std::time::Duration;

use microbit_gatt::mock::{MockBluetooth, MockPeripheral};
use microbit_gatt::{
    Bluetooth, GattError, GattServerFacade, RequestDeviceOptions, profile_services,
};
use microbit_proto::{DEVICE_NAME_PREFIX, PROFILE, ServiceDescriptor, profile};
use uuid::Uuid;

fn options(profile: &[ServiceDescriptor]) -> RequestDeviceOptions {
    RequestDeviceOptions {
        name_prefix: DEVICE_NAME_PREFIX.to_string(),
        optional_services: profile_services(profile).unwrap(),
    }
}

async fn resolve(
    mock: &MockPeripheral,
    profile: &[ServiceDescriptor],
) -> Result<GattServerFacade, GattError> {
    let bluetooth = MockBluetooth::with_device(mock.clone());
    let link = bluetooth.request_device(&options(PROFILE)).await?;
    GattServerFacade::resolve(link, profile).await
}

fn uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap()
}

#[tokio::test]
async fn every_declared_uuid_resolves() {
    let server = resolve(&MockPeripheral::microbit(), PROFILE).await.unwrap();

    for d in PROFILE {
        let service = server.service(uuid(d.service)).expect(d.service);
        assert_eq!(service.uuid(), uuid(d.service));
        for c in d.characteristics {
            let ch = server.characteristic(uuid(c)).expect(c);
            assert_eq!(ch.uuid(), uuid(c));
            assert_eq!(ch.service_uuid(), uuid(d.service));
        }
    }
    assert!(server.characteristic(uuid(profile::SERIAL_NUMBER_STRING)).is_none());
}

#[tokio::test]
async fn service_uuid_is_not_a_characteristic() {
    let server = resolve(&MockPeripheral::microbit(), PROFILE).await.unwrap();
    assert!(server.characteristic(uuid(profile::LED_SERVICE)).is_none());
    assert!(server.service(uuid(profile::LED_TEXT)).is_none());
}

#[tokio::test]
async fn flattened_characteristics_follow_profile_order() {
    let server = resolve(&MockPeripheral::microbit(), PROFILE).await.unwrap();

    let expected: Vec<Uuid> = PROFILE
        .iter()
        .flat_map(|d| d.characteristics.iter().map(|c| uuid(c)))
        .collect();
    let actual: Vec<Uuid> = server.resolve_all_characteristics().map(|c| c.uuid()).collect();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn scrolling_delay_round_trips_little_endian() {
    let mock = MockPeripheral::microbit();
    let server = resolve(&mock, PROFILE).await.unwrap();
    let delay = server.characteristic_by_str(profile::SCROLLING_DELAY).unwrap();

    for v in [0u16, 100, 0x1234, u16::MAX] {
        delay.write_bytes(&microbit_proto::scrolling_delay_bytes(v)).await.unwrap();
        let raw = delay.read_bytes().await.unwrap();
        assert_eq!(raw, vec![(v & 0xff) as u8, (v >> 8) as u8]);
        assert_eq!(microbit_proto::parse_scrolling_delay(&raw), Some(v));
    }
}

#[tokio::test]
async fn read_text_is_idempotent() {
    let mock = MockPeripheral::microbit();
    let server = resolve(&mock, PROFILE).await.unwrap();
    let model = server.characteristic_by_str(profile::MODEL_NUMBER_STRING).unwrap();

    let first = model.read_text().await.unwrap();
    let second = model.read_text().await.unwrap();
    assert_eq!(first, "BBC micro:bit V2.0");
    assert_eq!(first, second);
    assert_eq!(mock.read_count(profile::MODEL_NUMBER_STRING), 2);
}

#[tokio::test]
async fn read_text_replaces_invalid_utf8() {
    let mock = MockPeripheral::microbit();
    mock.set_value(profile::FIRMWARE_REVISION_STRING, &[b'v', 0xff, b'2']);
    let server = resolve(&mock, PROFILE).await.unwrap();
    let firmware = server.characteristic_by_str(profile::FIRMWARE_REVISION_STRING).unwrap();
    assert_eq!(firmware.read_text().await.unwrap(), "v\u{fffd}2");
}

#[tokio::test]
async fn write_text_boundaries() {
    let mock = MockPeripheral::microbit();
    let server = resolve(&mock, PROFILE).await.unwrap();
    let text = server.characteristic_by_str(profile::LED_TEXT).unwrap();

    text.write_text("").await.unwrap();
    assert!(mock.writes().is_empty());

    text.write_text(&"A".repeat(20)).await.unwrap();
    assert_eq!(mock.writes_to(profile::LED_TEXT), vec![vec![b'A'; 20]]);

    // the transport enforces the ceiling, the facade does not check
    let err = text.write_text(&"A".repeat(21)).await.unwrap_err();
    assert!(matches!(err, GattError::Platform(_)), "{err}");
    assert_eq!(mock.writes().len(), 1);
}

#[tokio::test]
async fn missing_service_fails_resolution() {
    let mock = MockPeripheral::microbit();
    mock.remove_service(profile::UART_SERVICE);
    let err = resolve(&mock, PROFILE).await.unwrap_err();
    assert!(matches!(err, GattError::ServiceNotFound(u) if u == uuid(profile::UART_SERVICE)));
}

#[tokio::test]
async fn services_not_requested_are_refused() {
    let mock = MockPeripheral::microbit();
    let bluetooth = MockBluetooth::with_device(mock.clone());
    let link = bluetooth.request_device(&options(&PROFILE[..3])).await.unwrap();

    let err = GattServerFacade::resolve(link, PROFILE).await.unwrap_err();
    assert!(matches!(err, GattError::ServiceNotAllowed(u) if u == uuid(profile::UART_SERVICE)));
}

#[tokio::test]
async fn blocklisted_characteristic_is_never_requested() {
    let profile = [ServiceDescriptor {
        service: profile::DEVICE_INFORMATION,
        characteristics: &[profile::MODEL_NUMBER_STRING, profile::SERIAL_NUMBER_STRING],
    }];
    let err = resolve(&MockPeripheral::microbit(), &profile).await.unwrap_err();
    assert!(matches!(err, GattError::Blocklisted(u) if u == uuid(profile::SERIAL_NUMBER_STRING)));
}

#[tokio::test]
async fn duplicate_declaration_is_rejected() {
    let profile = [ServiceDescriptor {
        service: profile::DEVICE_INFORMATION,
        characteristics: &[profile::MODEL_NUMBER_STRING, profile::MODEL_NUMBER_STRING],
    }];
    let err = resolve(&MockPeripheral::microbit(), &profile).await.unwrap_err();
    assert!(matches!(err, GattError::DuplicateUuid(u) if u == uuid(profile::MODEL_NUMBER_STRING)));
}

#[tokio::test]
async fn read_failure_carries_platform_reason() {
    let mock = MockPeripheral::microbit();
    mock.fail(profile::MODEL_NUMBER_STRING);
    let server = resolve(&mock, PROFILE).await.unwrap();

    let err = server
        .characteristic_by_str(profile::MODEL_NUMBER_STRING)
        .unwrap()
        .read_text()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("GATT operation failed"));

    // siblings are unaffected
    let firmware = server.characteristic_by_str(profile::FIRMWARE_REVISION_STRING).unwrap();
    assert_eq!(firmware.read_text().await.unwrap(), "2.1.1");
}

#[tokio::test]
async fn subscription_delivers_own_notifications_until_dropped() {
    let mock = MockPeripheral::microbit();
    let server = resolve(&mock, PROFILE).await.unwrap();
    let button_a = server.characteristic_by_str(profile::BUTTON_A_STATE).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let subscription = button_a
        .subscribe(move |value| {
            let _ = tx.send(value);
        })
        .await
        .unwrap();
    assert!(mock.is_subscribed(profile::BUTTON_A_STATE));
    assert!(!mock.is_subscribed(profile::BUTTON_B_STATE));

    assert!(mock.notify(profile::BUTTON_A_STATE, &[1]));
    let value = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_eq!(value, Some(vec![1]));

    // not subscribed, so the mock refuses to push it
    assert!(!mock.notify(profile::BUTTON_B_STATE, &[2]));

    subscription.cancel();
    mock.notify(profile::BUTTON_A_STATE, &[2]);
    let value = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn subscribe_requires_notify_support() {
    let server = resolve(&MockPeripheral::microbit(), PROFILE).await.unwrap();
    let text = server.characteristic_by_str(profile::LED_TEXT).unwrap();
    assert!(text.subscribe(|_| {}).await.is_err());
}

#[tokio::test]
async fn disconnect_ends_the_link() {
    let mock = MockPeripheral::microbit();
    let server = resolve(&mock, PROFILE).await.unwrap();
    assert!(server.is_connected().await);

    server.disconnect().await.unwrap();
    assert!(!server.is_connected().await);

    let text = server.characteristic_by_str(profile::LED_TEXT).unwrap();
    assert!(matches!(text.write_text("x").await, Err(GattError::NotConnected)));
}
