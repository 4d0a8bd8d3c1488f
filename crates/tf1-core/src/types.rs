//! Core types for the TF1 link
//!
//! Newtypes for peripheral addresses, GATT attribute descriptions and the
//! payload handed to the transfer engine.

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Tf1Error;

// ----------------------------------------------------------------------------
// Bluetooth UUIDs
// ----------------------------------------------------------------------------

/// Bluetooth SIG base UUID (0000xxxx-0000-1000-8000-00805F9B34FB)
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Generic Access service
pub const GENERIC_ACCESS_SERVICE: u16 = 0x1800;

/// Generic Attribute service
pub const GENERIC_ATTRIBUTE_SERVICE: u16 = 0x1801;

/// Client Characteristic Configuration descriptor
pub const CLIENT_CHARACTERISTIC_CONFIG: u16 = 0x2902;

/// Expand a 16-bit SIG UUID to its full 128-bit form
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// The 16-bit form of a SIG UUID, if the UUID is one
pub fn uuid_to_u16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & !(0xFFFF_u128 << 96) == BLUETOOTH_BASE_UUID {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

// ----------------------------------------------------------------------------
// Peripheral Identity
// ----------------------------------------------------------------------------

/// 6-byte Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    /// Create an address from its 6 bytes, most significant first
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for BdAddr {
    type Err = Tf1Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Tf1Error::InvalidConfig(format!("Invalid device address: {s}"));
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl Deref for BdAddr {
    type Target = [u8; 6];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Advertised address type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressType {
    #[default]
    Public,
    Random,
}

/// Address and address type of the peripheral being served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralIdentity {
    pub address: BdAddr,
    pub address_type: AddressType,
}

impl PeripheralIdentity {
    pub fn new(address: BdAddr, address_type: AddressType) -> Self {
        Self {
            address,
            address_type,
        }
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.address, self.address_type)
    }
}

// ----------------------------------------------------------------------------
// GATT Attributes
// ----------------------------------------------------------------------------

/// Attribute handle range of one discovered primary service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceRange {
    pub start_handle: u16,
    pub end_handle: u16,
    pub uuid: Uuid,
}

impl ServiceRange {
    pub fn new(start_handle: u16, end_handle: u16, uuid: Uuid) -> Self {
        Self {
            start_handle,
            end_handle,
            uuid,
        }
    }

    /// Generic Access or Generic Attribute, which never carry the data channel
    pub fn is_standard(&self) -> bool {
        matches!(
            uuid_to_u16(&self.uuid),
            Some(GENERIC_ACCESS_SERVICE | GENERIC_ATTRIBUTE_SERVICE)
        )
    }
}

impl fmt::Display for ServiceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}..{:04X} {}",
            self.start_handle, self.end_handle, self.uuid
        )
    }
}

/// Characteristic property bits as declared by the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharProperties(u8);

impl CharProperties {
    pub const NONE: Self = Self(0x00);
    pub const BROADCAST: Self = Self(0x01);
    pub const READ: Self = Self(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);

    /// Create properties from the raw declaration byte
    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Get raw byte value
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Combine two property sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Accepts write or write-without-response
    pub const fn can_write(self) -> bool {
        self.0 & (Self::WRITE.0 | Self::WRITE_WITHOUT_RESPONSE.0) != 0
    }

    /// Supports notify or indicate
    pub const fn can_notify(self) -> bool {
        self.0 & (Self::NOTIFY.0 | Self::INDICATE.0) != 0
    }
}

impl core::ops::BitOr for CharProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// One characteristic inside a service range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub handle: u16,
    pub uuid: Uuid,
    pub properties: CharProperties,
}

/// One descriptor of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub handle: u16,
    pub uuid: Uuid,
}

impl DescriptorInfo {
    pub fn is_client_config(&self) -> bool {
        uuid_to_u16(&self.uuid) == Some(CLIENT_CHARACTERISTIC_CONFIG)
    }
}

// ----------------------------------------------------------------------------
// Payload
// ----------------------------------------------------------------------------

/// Immutable payload blob streamed to the peripheral
///
/// Cloning is cheap; every clone shares the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Arc<[u8]>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    /// Read a payload file produced by the payload generator
    pub fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        std::fs::read(path).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
