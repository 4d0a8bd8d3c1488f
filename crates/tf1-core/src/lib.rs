//! TF1 Link Core
//!
//! Client-side engine that finds a TF1 peripheral over Bluetooth Low Energy,
//! selects its data characteristics and streams an opaque payload to it with
//! the framed, acknowledged, chunked TF1 transfer protocol.
//!
//! ## Architecture
//!
//! - [`protocol::frame`] - bit-exact encode/decode of TF1 frames
//! - [`protocol::reassembly`] - rebuilds response frames from notification fragments
//! - [`protocol::selector`] - picks the write/notify characteristic pair
//! - [`protocol::transfer`] - handshake, chunk, ack and retry cycle
//! - [`link`] - discovery and connection state machine driving all of the above
//! - [`gatt`] - the radio collaborator interface and the events it delivers
//!
//! The radio itself lives behind [`GattClient`]; `tf1-ble` provides a
//! btleplug implementation.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod gatt;
pub mod link;
pub mod protocol;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::LinkConfig;
pub use errors::{FrameError, ReassemblyError, Result, Tf1Error, TransportError};
pub use gatt::{event_channel, EventReceiver, EventSender, GattClient, GattEvent, GattStatus};
pub use link::{Link, LinkState, MtuState};
pub use protocol::frame::{Command, Response};
pub use protocol::reassembly::ReassemblyBuffer;
pub use protocol::selector::{select_characteristics, CharacteristicSelection, DiscoveredService};
pub use protocol::transfer::{TransferAction, TransferPhase, TransferSession, TransferStatus};
pub use types::{
    uuid_from_u16, AddressType, BdAddr, CharProperties, CharacteristicInfo, DescriptorInfo,
    Payload, PeripheralIdentity, ServiceRange,
};
