//! Error types for the TF1 link
//!
//! Protocol, capacity and transport failures are reported through these types
//! inside the link. Handlers log them and carry on; only construction-time
//! failures reach a caller.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Frame encode/decode failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
    #[error("Short frame: {len} bytes")]
    ShortFrame { len: usize },
    #[error("Unhandled command {0}")]
    UnhandledCommand(u8),
    #[error("Payload length {len} does not fit the handshake length field")]
    PayloadTooLarge { len: usize },
}

/// Notification reassembly failures; the partial frame is always discarded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    #[error("Reassembly overflow: {buffered} buffered + {incoming} incoming exceeds {capacity}")]
    Overflow {
        buffered: usize,
        incoming: usize,
        capacity: usize,
    },
    #[error("Invalid declared length: {expected} exceeds {capacity}")]
    InvalidLength { expected: usize, capacity: usize },
}

/// Failures reported by the radio collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{op} failed: {reason}")]
    Operation { op: &'static str, reason: String },
    #[error("BLE adapter not available")]
    AdapterUnavailable,
    #[error("Not connected")]
    NotConnected,
    #[error("Unknown attribute handle 0x{0:04X}")]
    UnknownHandle(u16),
}

impl TransportError {
    /// Wrap a collaborator failure for the named operation
    pub fn operation(op: &'static str, reason: impl ToString) -> Self {
        TransportError::Operation {
            op,
            reason: reason.to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Unified error type for the TF1 link
#[derive(Debug, thiserror::Error)]
pub enum Tf1Error {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = core::result::Result<T, Tf1Error>;
