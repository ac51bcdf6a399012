//! Bridge between a BLE game controller and a BLE motor hub.
//!
//! Scans for both peripherals, connects to them in order, and forwards
//! mapped drive commands on a fixed control period, recovering through a
//! fresh discovery cycle whenever a link drops. The transport is behind
//! the [`infrastructure::ble::transport::Transport`] trait so the whole
//! lifecycle runs against the in-memory backend in tests.

pub mod app;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use app::{BridgeApp, BridgeConfig, ControlPipeline, RetryPolicy};
pub use error::BridgeError;
