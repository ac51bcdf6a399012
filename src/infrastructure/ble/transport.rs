//! Transport abstraction over the underlying wireless stack.
//!
//! The bridge never talks to a protocol stack directly; it goes through
//! these traits. Scan results and disconnect notifications are delivered
//! through plain closures on the transport's own execution context, so
//! any state they touch must be behind a mutex or an atomic.

use crate::domain::models::DeviceAddress;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A broadcast packet observed during a scan.
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub name: String,
    pub address: DeviceAddress,
    pub rssi: i16,
}

/// Events delivered to the scan handler.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Advertisement(Advertisement),
    /// The scan ended, either naturally or via [`Transport::stop_scan`].
    /// Delivered exactly once per scan.
    Complete,
}

pub type ScanHandler = Arc<dyn Fn(ScanEvent) + Send + Sync>;
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Scan timing parameters. Interval and window are in transport-specific
/// units and passed through untouched.
#[derive(Debug, Clone, Copy)]
pub struct ScanParams {
    pub duration: Duration,
    pub interval: u16,
    pub window: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is not initialized")]
    NotInitialized,
    #[error("transport stack failed to initialize: {0}")]
    InitFailed(String),
    #[error("connection to {0} failed")]
    ConnectFailed(DeviceAddress),
}

/// The underlying wireless stack.
pub trait Transport: Send + Sync {
    /// Bring up the stack. Must be called before anything else.
    fn init(&self) -> Result<(), TransportError>;

    /// Start a time-bounded asynchronous scan. `on_event` is invoked on
    /// the transport's execution context for every observed advertisement
    /// and once with [`ScanEvent::Complete`] when the scan ends.
    fn start_scan(&self, params: ScanParams, on_event: ScanHandler) -> Result<(), TransportError>;

    /// Force early termination of a running scan. A final
    /// [`ScanEvent::Complete`] is still delivered. No-op when idle.
    fn stop_scan(&self);

    /// Create a client handle for one peripheral connection.
    fn create_client(&self) -> Result<Box<dyn TransportClient>, TransportError>;
}

/// One peripheral connection handle. Owned exclusively by the connection
/// supervisor.
pub trait TransportClient: Send {
    /// Blocking connect; runs to completion or stack-level timeout.
    fn connect(&mut self, address: &DeviceAddress) -> Result<(), TransportError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Register the handler invoked (once per disconnect event, on the
    /// transport's execution context) when the link drops.
    fn set_disconnect_handler(&mut self, handler: DisconnectHandler);
}
