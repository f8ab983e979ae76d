//! micro:bit demo controller
//!
//! Binds the GATT facades of `microbit-gatt` to a page of named fields and
//! buttons: connect/disconnect, device information, button notifications,
//! LED text and matrix, UART request/response and a guided self-test.

mod buttons;
pub mod config;
mod controller;
mod error;
pub mod lifecycle;
pub mod selftest;
pub mod ui;

pub use buttons::ButtonPanel;
pub use config::{ControllerConfig, controller_home};
pub use controller::{Action, Controller, LINK_CHECK_INTERVAL};
pub use error::{ConfigError, ControllerError};
pub use lifecycle::ConnectionState;
pub use ui::{ActionButton, Page, TextField, UiEvent, ids};
