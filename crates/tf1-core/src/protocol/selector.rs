//! Characteristic selection
//!
//! Chooses the write and notify characteristics used for the transfer from
//! the services found on a freshly connected peripheral. Vendor services are
//! searched before Generic Access / Generic Attribute, in discovery order, and
//! the first service holding both a writable and a notifying characteristic
//! wins. Failing that, the first service with any writable characteristic is
//! used on its own.

use tracing::debug;

use crate::types::{CharacteristicInfo, ServiceRange};

// ----------------------------------------------------------------------------
// Selection Types
// ----------------------------------------------------------------------------

/// A discovered service together with its characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub range: ServiceRange,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl DiscoveredService {
    pub fn new(range: ServiceRange, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            range,
            characteristics,
        }
    }
}

/// Characteristics chosen for the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicSelection {
    pub service_start: u16,
    pub service_end: u16,
    pub write_handle: u16,
    /// `None` when only the write-only fallback was available
    pub notify_handle: Option<u16>,
    /// Filled in once the notify characteristic's descriptors are read
    pub ccc_handle: Option<u16>,
}

impl CharacteristicSelection {
    /// Both a write and a notify characteristic were found
    pub fn is_complete(&self) -> bool {
        self.notify_handle.is_some()
    }
}

// ----------------------------------------------------------------------------
// Selection
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Vendor,
    Standard,
}

impl Pass {
    fn includes(self, range: &ServiceRange) -> bool {
        match self {
            Pass::Vendor => !range.is_standard(),
            Pass::Standard => range.is_standard(),
        }
    }
}

/// First writable and first notifying characteristic of one service
fn candidates(characteristics: &[CharacteristicInfo]) -> (Option<u16>, Option<u16>) {
    let write = characteristics
        .iter()
        .find(|c| c.properties.can_write())
        .map(|c| c.handle);
    let notify = characteristics
        .iter()
        .find(|c| c.properties.can_notify())
        .map(|c| c.handle);
    (write, notify)
}

/// Pick the write/notify pair for the transfer
///
/// Returns `None` only when no service exposes a writable characteristic.
pub fn select_characteristics(services: &[DiscoveredService]) -> Option<CharacteristicSelection> {
    let mut fallback: Option<CharacteristicSelection> = None;

    for pass in [Pass::Vendor, Pass::Standard] {
        for service in services.iter().filter(|s| pass.includes(&s.range)) {
            let (write, notify) = candidates(&service.characteristics);
            let Some(write_handle) = write else {
                continue;
            };

            let selection = CharacteristicSelection {
                service_start: service.range.start_handle,
                service_end: service.range.end_handle,
                write_handle,
                notify_handle: notify,
                ccc_handle: None,
            };

            if selection.is_complete() {
                debug!(?pass, "Selected service {}", service.range);
                return Some(selection);
            }
            if fallback.is_none() {
                fallback = Some(selection);
            }
        }

        if fallback.is_some() {
            break;
        }
    }

    if let Some(selection) = &fallback {
        debug!(
            "Falling back to write-only service {:04X}..{:04X}",
            selection.service_start, selection.service_end
        );
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{uuid_from_u16, CharProperties};
    use uuid::Uuid;

    const VENDOR: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

    fn characteristic(handle: u16, properties: CharProperties) -> CharacteristicInfo {
        CharacteristicInfo {
            handle,
            uuid: uuid_from_u16(0xFFE1),
            properties,
        }
    }

    fn service(start: u16, end: u16, uuid: Uuid, chars: Vec<CharacteristicInfo>) -> DiscoveredService {
        DiscoveredService::new(ServiceRange::new(start, end, uuid), chars)
    }

    #[test]
    fn test_vendor_pair_preferred_over_standard_pair() {
        let services = vec![
            service(
                1,
                5,
                uuid_from_u16(0x1800),
                vec![
                    characteristic(3, CharProperties::WRITE),
                    characteristic(5, CharProperties::NOTIFY),
                ],
            ),
            service(
                0x10,
                0x20,
                VENDOR,
                vec![
                    characteristic(0x12, CharProperties::NOTIFY),
                    characteristic(0x15, CharProperties::WRITE_WITHOUT_RESPONSE),
                ],
            ),
        ];

        let selection = select_characteristics(&services).unwrap();
        assert_eq!(selection.service_start, 0x10);
        assert_eq!(selection.service_end, 0x20);
        assert_eq!(selection.write_handle, 0x15);
        assert_eq!(selection.notify_handle, Some(0x12));
        assert_eq!(selection.ccc_handle, None);
    }

    #[test]
    fn test_vendor_write_only_fallback_blocks_standard_pass() {
        let services = vec![
            service(
                1,
                5,
                uuid_from_u16(0x1800),
                vec![characteristic(3, CharProperties::WRITE | CharProperties::NOTIFY)],
            ),
            service(0x10, 0x20, VENDOR, vec![characteristic(0x12, CharProperties::WRITE)]),
        ];

        let selection = select_characteristics(&services).unwrap();
        assert_eq!(selection.write_handle, 0x12);
        assert_eq!(selection.notify_handle, None);
        assert!(!selection.is_complete());
    }

    #[test]
    fn test_standard_pass_used_when_no_vendor_writes() {
        let services = vec![
            service(0x10, 0x20, VENDOR, vec![characteristic(0x12, CharProperties::READ)]),
            service(
                1,
                5,
                uuid_from_u16(0x1801),
                vec![
                    characteristic(2, CharProperties::INDICATE),
                    characteristic(4, CharProperties::WRITE),
                ],
            ),
        ];

        let selection = select_characteristics(&services).unwrap();
        assert_eq!(selection.write_handle, 4);
        assert_eq!(selection.notify_handle, Some(2));
    }

    #[test]
    fn test_discovery_order_breaks_ties() {
        let services = vec![
            service(
                0x30,
                0x40,
                VENDOR,
                vec![characteristic(0x31, CharProperties::WRITE | CharProperties::NOTIFY)],
            ),
            service(
                0x10,
                0x20,
                VENDOR,
                vec![characteristic(0x11, CharProperties::WRITE | CharProperties::NOTIFY)],
            ),
        ];

        let selection = select_characteristics(&services).unwrap();
        assert_eq!(selection.service_start, 0x30);
        assert_eq!(selection.write_handle, 0x31);
        assert_eq!(selection.notify_handle, Some(0x31));
    }

    #[test]
    fn test_later_pair_beats_earlier_write_only_service() {
        let services = vec![
            service(0x10, 0x20, VENDOR, vec![characteristic(0x11, CharProperties::WRITE)]),
            service(
                0x30,
                0x40,
                VENDOR,
                vec![
                    characteristic(0x31, CharProperties::WRITE),
                    characteristic(0x33, CharProperties::NOTIFY),
                ],
            ),
        ];

        let selection = select_characteristics(&services).unwrap();
        assert_eq!(selection.write_handle, 0x31);
        assert_eq!(selection.notify_handle, Some(0x33));
    }

    #[test]
    fn test_no_writable_characteristic() {
        let services = vec![
            service(0x10, 0x20, VENDOR, vec![characteristic(0x12, CharProperties::NOTIFY)]),
            service(1, 5, uuid_from_u16(0x1800), vec![characteristic(3, CharProperties::READ)]),
        ];
        assert_eq!(select_characteristics(&services), None);
        assert_eq!(select_characteristics(&[]), None);
    }
}
