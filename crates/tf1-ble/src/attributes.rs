//! Attribute handle table
//!
//! btleplug identifies attributes by UUID and hides ATT handles. The link
//! works in handles, so after each service discovery every service,
//! characteristic and descriptor is numbered in discovery order starting
//! at 1. A service's range covers its own handle through its last
//! descriptor.

use std::collections::HashMap;

use btleplug::api::{Characteristic, Descriptor, Service};
use tf1_core::{CharProperties, CharacteristicInfo, DescriptorInfo, ServiceRange};
use tracing::warn;
use uuid::Uuid;

use crate::error::BleError;

// ----------------------------------------------------------------------------
// Table Entries
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CharacteristicAttribute {
    pub info: CharacteristicInfo,
    pub service_start: u16,
    pub characteristic: Characteristic,
}

#[derive(Debug, Clone)]
pub struct DescriptorAttribute {
    pub info: DescriptorInfo,
    pub characteristic_handle: u16,
    pub descriptor: Descriptor,
}

// ----------------------------------------------------------------------------
// Attribute Table
// ----------------------------------------------------------------------------

/// Synthetic handle numbering for one connection's GATT database
#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    services: Vec<ServiceRange>,
    characteristics: Vec<CharacteristicAttribute>,
    descriptors: Vec<DescriptorAttribute>,
}

impl AttributeTable {
    /// Number the primary services in the order given
    pub fn build<'a>(services: impl IntoIterator<Item = &'a Service>) -> Self {
        let mut table = Self::default();
        let mut next: u16 = 1;

        for service in services.into_iter().filter(|s| s.primary) {
            if table.push_service(service, &mut next).is_none() {
                warn!("Attribute handle space exhausted, later services dropped");
                break;
            }
        }
        table
    }

    fn push_service(&mut self, service: &Service, next: &mut u16) -> Option<()> {
        let start = take_handle(next)?;
        let mut end = start;

        for characteristic in &service.characteristics {
            let handle = take_handle(next)?;
            end = handle;
            self.characteristics.push(CharacteristicAttribute {
                info: CharacteristicInfo {
                    handle,
                    uuid: characteristic.uuid,
                    properties: CharProperties::new(characteristic.properties.bits()),
                },
                service_start: start,
                characteristic: characteristic.clone(),
            });

            for descriptor in &characteristic.descriptors {
                let descriptor_handle = take_handle(next)?;
                end = descriptor_handle;
                self.descriptors.push(DescriptorAttribute {
                    info: DescriptorInfo {
                        handle: descriptor_handle,
                        uuid: descriptor.uuid,
                    },
                    characteristic_handle: handle,
                    descriptor: descriptor.clone(),
                });
            }
        }

        self.services.push(ServiceRange::new(start, end, service.uuid));
        Some(())
    }

    /// Service ranges in discovery order
    pub fn services(&self) -> &[ServiceRange] {
        &self.services
    }

    /// Characteristics of the service starting at `service_start`
    pub fn characteristics(&self, service_start: u16) -> Result<Vec<CharacteristicInfo>, BleError> {
        if !self.services.iter().any(|s| s.start_handle == service_start) {
            return Err(BleError::UnknownHandle(service_start));
        }
        Ok(self
            .characteristics
            .iter()
            .filter(|c| c.service_start == service_start)
            .map(|c| c.info)
            .collect())
    }

    /// Descriptors of the characteristic at `characteristic`
    pub fn descriptors(&self, characteristic: u16) -> Result<Vec<DescriptorInfo>, BleError> {
        self.characteristic(characteristic)?;
        Ok(self
            .descriptors
            .iter()
            .filter(|d| d.characteristic_handle == characteristic)
            .map(|d| d.info)
            .collect())
    }

    pub fn characteristic(&self, handle: u16) -> Result<&CharacteristicAttribute, BleError> {
        self.characteristics
            .iter()
            .find(|c| c.info.handle == handle)
            .ok_or(BleError::UnknownHandle(handle))
    }

    pub fn descriptor(&self, handle: u16) -> Result<&DescriptorAttribute, BleError> {
        self.descriptors
            .iter()
            .find(|d| d.info.handle == handle)
            .ok_or(BleError::UnknownHandle(handle))
    }

    /// Handle reported for notifications carrying a characteristic UUID
    ///
    /// When several services reuse a UUID the first notifying one wins.
    pub fn notification_handles(&self) -> HashMap<Uuid, u16> {
        let mut handles = HashMap::new();
        for c in self.characteristics.iter().filter(|c| c.info.properties.can_notify()) {
            handles.entry(c.info.uuid).or_insert(c.info.handle);
        }
        handles
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn take_handle(next: &mut u16) -> Option<u16> {
    let handle = *next;
    *next = next.checked_add(1)?;
    Some(handle)
}
