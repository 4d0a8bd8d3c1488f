//! Radio collaborator interface
//!
//! The link never talks to a Bluetooth stack directly. It issues operations
//! through [`GattClient`] and learns their outcome later from [`GattEvent`]s
//! delivered, one at a time, over a single-consumer channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::types::{CharacteristicInfo, DescriptorInfo, PeripheralIdentity, ServiceRange};

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Completion status reported with an asynchronous GATT event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    Failure(String),
}

impl GattStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, GattStatus::Success)
    }
}

impl<E: ToString> From<core::result::Result<(), E>> for GattStatus {
    fn from(result: core::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => GattStatus::Success,
            Err(e) => GattStatus::Failure(e.to_string()),
        }
    }
}

/// Events delivered by the radio collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    /// Advertisement or scan response received while scanning
    Advertisement {
        identity: PeripheralIdentity,
        complete_name: Option<String>,
        short_name: Option<String>,
    },
    /// Connection to the requested peripheral is open
    ConnectionOpened { identity: PeripheralIdentity },
    /// Connection attempt failed
    ConnectionFailed { reason: String },
    /// MTU exchange finished, successfully or not
    MtuExchanged { status: GattStatus, mtu: Option<u16> },
    /// One primary service found during discovery
    ServiceDiscovered(ServiceRange),
    /// Service discovery finished
    DiscoveryComplete { status: GattStatus },
    /// Descriptor write acknowledged by the peripheral
    DescriptorWritten { handle: u16, status: GattStatus },
    /// Characteristic write completed
    CharacteristicWritten { handle: u16, status: GattStatus },
    /// Notification or indication fragment
    Notification { handle: u16, value: Vec<u8> },
    /// Connection closed for any reason
    Disconnected { reason: Option<String> },
}

impl GattEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            GattEvent::Advertisement { .. } => "Advertisement",
            GattEvent::ConnectionOpened { .. } => "ConnectionOpened",
            GattEvent::ConnectionFailed { .. } => "ConnectionFailed",
            GattEvent::MtuExchanged { .. } => "MtuExchanged",
            GattEvent::ServiceDiscovered(_) => "ServiceDiscovered",
            GattEvent::DiscoveryComplete { .. } => "DiscoveryComplete",
            GattEvent::DescriptorWritten { .. } => "DescriptorWritten",
            GattEvent::CharacteristicWritten { .. } => "CharacteristicWritten",
            GattEvent::Notification { .. } => "Notification",
            GattEvent::Disconnected { .. } => "Disconnected",
        }
    }
}

// ----------------------------------------------------------------------------
// Event Channel
// ----------------------------------------------------------------------------

pub type EventSender = mpsc::UnboundedSender<GattEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<GattEvent>;

/// Single-consumer channel carrying collaborator events to the link
///
/// Unbounded so that a client can report completions from inside an
/// operation the link is currently awaiting.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Client Trait
// ----------------------------------------------------------------------------

/// Operations the link needs from a Bluetooth stack
///
/// Methods that start an operation return once it has been issued; its
/// completion arrives as a [`GattEvent`]. `characteristics` and `descriptors`
/// answer from the attribute cache filled by service discovery.
#[async_trait]
pub trait GattClient: Send {
    async fn start_scan(&mut self) -> Result<(), TransportError>;

    async fn stop_scan(&mut self) -> Result<(), TransportError>;

    /// Completes with `ConnectionOpened` or `ConnectionFailed`
    async fn connect(&mut self, identity: PeripheralIdentity) -> Result<(), TransportError>;

    /// Completes with `Disconnected`
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Completes with `MtuExchanged`
    async fn negotiate_mtu(&mut self) -> Result<(), TransportError>;

    /// Completes with zero or more `ServiceDiscovered` then `DiscoveryComplete`
    async fn discover_services(&mut self) -> Result<(), TransportError>;

    fn characteristics(
        &self,
        service: &ServiceRange,
    ) -> Result<Vec<CharacteristicInfo>, TransportError>;

    fn descriptors(&self, characteristic: u16) -> Result<Vec<DescriptorInfo>, TransportError>;

    async fn write_characteristic(&mut self, handle: u16, value: &[u8])
        -> Result<(), TransportError>;

    /// Completes with `DescriptorWritten`
    async fn write_descriptor(&mut self, handle: u16, value: &[u8]) -> Result<(), TransportError>;
}
