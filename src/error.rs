//! Bridge error taxonomy.
//!
//! Only disconnect events are automatically recoverable (they re-enter the
//! discovery cycle); everything else is reported and, where it reaches the
//! top of the supervisor, terminal.

use crate::domain::models::Role;
use crate::infrastructure::ble::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Transport stack failed to initialize. Fatal for this run.
    #[error("transport initialization failed: {source}")]
    Init {
        #[source]
        source: TransportError,
    },

    /// A role was never discovered (raised only when a scan-retry ceiling
    /// is configured and exhausted).
    #[error("{role} was not found during discovery")]
    DeviceNotFound { role: Role },

    /// A connect attempt failed. Aborts the current connect sequence but
    /// leaves the supervisor retryable.
    #[error("failed to connect to {role}: {source}")]
    ConnectFailed {
        role: Role,
        #[source]
        source: TransportError,
    },

    /// A connected role dropped. Triggers a full recovery cycle.
    #[error("{role} disconnected")]
    Disconnected { role: Role },
}

impl BridgeError {
    /// Whether this error routes into the recovery cycle instead of the
    /// terminal error state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BridgeError::Disconnected { .. })
    }
}
