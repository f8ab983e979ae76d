use microbit_gatt::GattError;
use microbit_proto::GlyphError;

use crate::lifecycle::ConnectionState;

#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error("Bluetooth is not available on this platform")]
    Unavailable,
    #[error("cannot {action} while {state}")]
    Busy {
        action: &'static str,
        state: ConnectionState,
    },
    #[error("not connected to a micro:bit")]
    NotConnected,
    #[error("characteristic {0} was not resolved")]
    Unresolved(&'static str),
    #[error("device still reports connected after disconnect")]
    StillConnected,
    #[error("LED matrix state has {0} bytes, expected 5")]
    MatrixLength(usize),
    #[error("invalid LED pattern: {0}")]
    Glyph(#[from] GlyphError),
    #[error("a self-test is already running")]
    SelfTestRunning,
    #[error(transparent)]
    Gatt(#[from] GattError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
