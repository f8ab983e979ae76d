use uuid::Uuid;

/// Failure of a platform or facade GATT operation.
///
/// Platform failures carry the reason string the platform reported.
#[derive(thiserror::Error, Debug)]
pub enum GattError {
    #[error("Bluetooth is not available on this platform")]
    Unavailable,
    #[error("no device found with name prefix {0:?}")]
    NoDevice(String),
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),
    #[error("service {0} was not requested as an optional service")]
    ServiceNotAllowed(Uuid),
    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error("characteristic {0} is blocklisted")]
    Blocklisted(Uuid),
    #[error("{0} is declared more than once in the GATT profile")]
    DuplicateUuid(Uuid),
    #[error("invalid UUID in profile: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("GATT server is disconnected")]
    NotConnected,
    #[error("{0}")]
    Platform(String),
    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),
}
