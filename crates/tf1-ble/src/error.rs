//! Error types for the btleplug client

use tf1_core::{BdAddr, TransportError};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the btleplug client
#[derive(Error, Debug)]
pub enum BleError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Peripheral {0} was not seen while scanning")]
    PeripheralNotFound(BdAddr),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Peripheral not connected")]
    NotConnected,

    #[error("Unknown attribute handle 0x{0:04X}")]
    UnknownHandle(u16),

    #[error("Characteristic 0x{0:04X} does not support notifications")]
    NotifyUnsupported(u16),

    #[error("{op} failed: {source}")]
    Btleplug {
        op: &'static str,
        #[source]
        source: btleplug::Error,
    },
}

impl BleError {
    /// Attach the failing operation to a btleplug error
    pub fn btleplug(op: &'static str) -> impl FnOnce(btleplug::Error) -> Self {
        move |source| BleError::Btleplug { op, source }
    }
}

impl From<BleError> for TransportError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::AdapterNotAvailable => TransportError::AdapterUnavailable,
            BleError::NotConnected => TransportError::NotConnected,
            BleError::UnknownHandle(handle) => TransportError::UnknownHandle(handle),
            BleError::PeripheralNotFound(_) => TransportError::operation("connect", err),
            BleError::ConnectionTimeout => TransportError::operation("connect", err),
            BleError::NotifyUnsupported(_) => TransportError::operation("write_descriptor", err),
            BleError::Btleplug { op, source } => TransportError::operation(op, source),
        }
    }
}
