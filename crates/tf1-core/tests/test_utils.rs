//! Test utilities for driving the TF1 link without a radio
//!
//! [`MockGattClient`] records every operation the link issues and answers
//! attribute queries from a fixed table. Tests feed the matching
//! [`GattEvent`]s by hand, which keeps every step deterministic.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tf1_core::{
    uuid_from_u16, AddressType, BdAddr, CharProperties, CharacteristicInfo, DescriptorInfo,
    GattClient, GattEvent, GattStatus, Link, LinkConfig, LinkState, Payload, PeripheralIdentity,
    ServiceRange, TransportError,
};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Fixture Layout
// ----------------------------------------------------------------------------

pub const VENDOR_SERVICE: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

pub const SERVICE_START: u16 = 0x0010;
pub const SERVICE_END: u16 = 0x0020;
pub const WRITE_HANDLE: u16 = 0x0012;
pub const NOTIFY_HANDLE: u16 = 0x0014;
pub const CCC_HANDLE: u16 = 0x0015;

pub const HANDSHAKE: u8 = 17;
pub const CHUNK: u8 = 18;

pub fn target_identity() -> PeripheralIdentity {
    PeripheralIdentity::new(
        BdAddr::new([0xC0, 0x11, 0x22, 0x33, 0x44, 0x55]),
        AddressType::Random,
    )
}

pub fn vendor_range() -> ServiceRange {
    ServiceRange::new(SERVICE_START, SERVICE_END, VENDOR_SERVICE)
}

/// Config with pacing disabled so tests never sleep
pub fn test_config() -> LinkConfig {
    LinkConfig::default().with_write_slice_delay(Duration::ZERO)
}

/// Payload of `len` bytes counting up from zero
pub fn counting_payload(len: usize) -> Payload {
    Payload::new((0..len).map(|i| i as u8).collect::<Vec<u8>>())
}

/// Device response frame with the given command, status and value
pub fn response(command: u8, status: u8, value: u16) -> Vec<u8> {
    let [lo, hi] = value.to_le_bytes();
    vec![0xAA, command, 0x00, 0x5A, 0x08, 0x00, status, 0x00, lo, hi]
}

// ----------------------------------------------------------------------------
// Mock Client
// ----------------------------------------------------------------------------

/// One operation issued by the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(PeripheralIdentity),
    Disconnect,
    NegotiateMtu,
    DiscoverServices,
    WriteCharacteristic { handle: u16, value: Vec<u8> },
    WriteDescriptor { handle: u16, value: Vec<u8> },
}

/// Recording GATT client backed by a static attribute table
#[derive(Debug, Default)]
pub struct MockGattClient {
    pub calls: Vec<Call>,
    characteristics: HashMap<u16, Vec<CharacteristicInfo>>,
    descriptors: HashMap<u16, Vec<DescriptorInfo>>,
    pub fail_mtu: bool,
    pub fail_connect: bool,
}

impl MockGattClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vendor service with a write/notify pair and a CCC descriptor
    pub fn with_vendor_pair() -> Self {
        Self::new()
            .with_characteristics(
                SERVICE_START,
                vec![
                    CharacteristicInfo {
                        handle: WRITE_HANDLE,
                        uuid: uuid_from_u16(0xFFE2),
                        properties: CharProperties::WRITE_WITHOUT_RESPONSE,
                    },
                    CharacteristicInfo {
                        handle: NOTIFY_HANDLE,
                        uuid: uuid_from_u16(0xFFE1),
                        properties: CharProperties::NOTIFY,
                    },
                ],
            )
            .with_descriptors(
                NOTIFY_HANDLE,
                vec![DescriptorInfo {
                    handle: CCC_HANDLE,
                    uuid: uuid_from_u16(0x2902),
                }],
            )
    }

    pub fn with_characteristics(
        mut self,
        service_start: u16,
        characteristics: Vec<CharacteristicInfo>,
    ) -> Self {
        self.characteristics.insert(service_start, characteristics);
        self
    }

    pub fn with_descriptors(mut self, characteristic: u16, descriptors: Vec<DescriptorInfo>) -> Self {
        self.descriptors.insert(characteristic, descriptors);
        self
    }

    /// Every characteristic write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::WriteCharacteristic { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls.iter().filter(|call| *call == wanted).count()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

#[async_trait]
impl GattClient for MockGattClient {
    async fn start_scan(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::StartScan);
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::StopScan);
        Ok(())
    }

    async fn connect(&mut self, identity: PeripheralIdentity) -> Result<(), TransportError> {
        self.calls.push(Call::Connect(identity));
        if self.fail_connect {
            return Err(TransportError::operation("connect", "peripheral not reachable"));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Disconnect);
        Ok(())
    }

    async fn negotiate_mtu(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::NegotiateMtu);
        if self.fail_mtu {
            return Err(TransportError::operation("negotiate_mtu", "unsupported"));
        }
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::DiscoverServices);
        Ok(())
    }

    fn characteristics(
        &self,
        service: &ServiceRange,
    ) -> Result<Vec<CharacteristicInfo>, TransportError> {
        Ok(self
            .characteristics
            .get(&service.start_handle)
            .cloned()
            .unwrap_or_default())
    }

    fn descriptors(&self, characteristic: u16) -> Result<Vec<DescriptorInfo>, TransportError> {
        self.descriptors
            .get(&characteristic)
            .cloned()
            .ok_or(TransportError::UnknownHandle(characteristic))
    }

    async fn write_characteristic(
        &mut self,
        handle: u16,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.calls.push(Call::WriteCharacteristic {
            handle,
            value: value.to_vec(),
        });
        Ok(())
    }

    async fn write_descriptor(&mut self, handle: u16, value: &[u8]) -> Result<(), TransportError> {
        self.calls.push(Call::WriteDescriptor {
            handle,
            value: value.to_vec(),
        });
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Link Drivers
// ----------------------------------------------------------------------------

pub fn advertisement(short_name: &str) -> GattEvent {
    GattEvent::Advertisement {
        identity: target_identity(),
        complete_name: None,
        short_name: Some(short_name.to_string()),
    }
}

pub fn notification(value: Vec<u8>) -> GattEvent {
    GattEvent::Notification {
        handle: NOTIFY_HANDLE,
        value,
    }
}

/// Drive a fresh link from scanning up to the moment services are discovered
pub async fn drive_to_discovery(link: &mut Link<MockGattClient>) {
    link.start().await;
    link.handle_event(advertisement("NF-F2-0042")).await;
    link.handle_event(GattEvent::ConnectionOpened {
        identity: target_identity(),
    })
    .await;
    link.handle_event(GattEvent::MtuExchanged {
        status: GattStatus::Success,
        mtu: Some(247),
    })
    .await;
    link.handle_event(GattEvent::ServiceDiscovered(vendor_range()))
        .await;
    link.handle_event(GattEvent::DiscoveryComplete {
        status: GattStatus::Success,
    })
    .await;
}

/// Drive a fresh link until the handshake frame has been written
pub async fn drive_to_handshake(link: &mut Link<MockGattClient>) {
    drive_to_discovery(link).await;
    link.handle_event(GattEvent::DescriptorWritten {
        handle: CCC_HANDLE,
        status: GattStatus::Success,
    })
    .await;
    assert_eq!(link.state(), LinkState::NotificationsReady);
}

/// Link over the vendor fixture streaming `payload`
pub fn new_link(payload: Payload) -> Link<MockGattClient> {
    Link::new(MockGattClient::with_vendor_pair(), test_config(), payload)
        .expect("test config is valid")
}
