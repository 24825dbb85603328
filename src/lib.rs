//! BLE game controller link for nRF52 microcontrollers.
//!
//! The library holds everything that does not touch the radio: the report
//! codecs, the canonical gamepad state, the advertisement matcher and the
//! connection state machine.  The host stack plugs in through
//! [`ble::BleStack`], so the whole crate is testable on the host.
//!
//! Usage: `cargo test` for the host tests,
//! `cargo run --release --features embedded` for the firmware.
//!
//! Note: The embedded binary lives in main.rs with #![no_std] and #![no_main]
//! and links this library.

#![cfg_attr(not(test), no_std)]

// Must stay first: the logging macros are textually scoped.
#[macro_use]
mod fmt;

pub mod ble;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod gamepad;

pub use ble::state::{ConnectionState, LinkState};
pub use ble::{Address, BleStack};
pub use codec::output::RumbleReport;
pub use codec::{CodecFamily, ReportCodec};
pub use config::ControllerConfig;
pub use controller::GamepadController;
pub use error::Error;
pub use gamepad::{Button, DPad, GamepadState};
