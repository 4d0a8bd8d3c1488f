//! Connection management and data transmission

use btleplug::api::{Peripheral as _, WriteType};
use btleplug::platform::{Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tf1_core::{CharProperties, EventSender, GattEvent};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

use crate::attributes::AttributeTable;
use crate::error::BleError;

/// CCC value bits that turn notifications or indications on
const CCC_ENABLE_MASK: u8 = 0x03;

// ----------------------------------------------------------------------------
// Connection Management
// ----------------------------------------------------------------------------

/// One open connection and its attribute table
pub struct BleConnection {
    peripheral: Peripheral,
    table: AttributeTable,
    notification_task: Option<JoinHandle<()>>,
}

impl BleConnection {
    /// Connect to `peripheral`, giving up after `connection_timeout`
    pub async fn open(peripheral: Peripheral, connection_timeout: Duration) -> Result<Self, BleError> {
        match timeout(connection_timeout, peripheral.connect()).await {
            Ok(Ok(())) => {
                info!("Connected to {}", peripheral.address());
                Ok(Self {
                    peripheral,
                    table: AttributeTable::default(),
                    notification_task: None,
                })
            }
            Ok(Err(e)) => Err(BleError::Btleplug {
                op: "connect",
                source: e,
            }),
            Err(_) => Err(BleError::ConnectionTimeout),
        }
    }

    pub fn id(&self) -> PeripheralId {
        self.peripheral.id()
    }

    pub fn table(&self) -> &AttributeTable {
        &self.table
    }

    /// Run service discovery and renumber the attribute table
    pub async fn discover(&mut self) -> Result<&AttributeTable, BleError> {
        self.peripheral
            .discover_services()
            .await
            .map_err(BleError::btleplug("discover services"))?;
        let services = self.peripheral.services();
        self.table = AttributeTable::build(&services);
        debug!("Attribute table holds {} services", self.table.services().len());
        Ok(&self.table)
    }

    /// Write to a characteristic, without response when the peer allows it
    pub async fn write(&self, handle: u16, value: &[u8]) -> Result<(), BleError> {
        let attribute = self.table.characteristic(handle)?;
        let write_type = if attribute.info.properties.contains(CharProperties::WRITE_WITHOUT_RESPONSE) {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };

        self.peripheral
            .write(&attribute.characteristic, value, write_type)
            .await
            .map_err(BleError::btleplug("write characteristic"))?;
        debug!("Wrote {} bytes to 0x{:04X}", value.len(), handle);
        Ok(())
    }

    /// Write a descriptor
    ///
    /// A client-configuration write is carried out by subscribing or
    /// unsubscribing, which is the only way btleplug exposes it, and starts
    /// or stops the notification pump.
    pub async fn write_descriptor(
        &mut self,
        handle: u16,
        value: &[u8],
        events: &EventSender,
    ) -> Result<(), BleError> {
        let attribute = self.table.descriptor(handle)?.clone();
        if !attribute.info.is_client_config() {
            return self
                .peripheral
                .write_descriptor(&attribute.descriptor, value)
                .await
                .map_err(BleError::btleplug("write descriptor"));
        }

        let characteristic = self.table.characteristic(attribute.characteristic_handle)?.clone();
        let enable = value.first().is_some_and(|bits| bits & CCC_ENABLE_MASK != 0);
        if !enable {
            self.stop_notifications();
            return self
                .peripheral
                .unsubscribe(&characteristic.characteristic)
                .await
                .map_err(BleError::btleplug("unsubscribe"));
        }
        if !characteristic.info.properties.can_notify() {
            return Err(BleError::NotifyUnsupported(characteristic.info.handle));
        }

        self.peripheral
            .subscribe(&characteristic.characteristic)
            .await
            .map_err(BleError::btleplug("subscribe"))?;
        self.start_notifications(events.clone()).await
    }

    async fn start_notifications(&mut self, events: EventSender) -> Result<(), BleError> {
        if self.notification_task.is_some() {
            return Ok(());
        }

        let handles = self.table.notification_handles();
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(BleError::btleplug("open notification stream"))?;

        self.notification_task = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let Some(&handle) = handles.get(&notification.uuid) else {
                    debug!("Notification from unknown characteristic {}", notification.uuid);
                    continue;
                };
                debug!("notify 0x{:04X}: {}", handle, hex::encode(&notification.value));
                if events
                    .send(GattEvent::Notification {
                        handle,
                        value: notification.value,
                    })
                    .is_err()
                {
                    error!("Event channel closed, dropping notifications");
                    break;
                }
            }
            debug!("Notification pump ended");
        }));
        Ok(())
    }

    fn stop_notifications(&mut self) {
        if let Some(task) = self.notification_task.take() {
            task.abort();
        }
    }

    /// Disconnect and stop the notification pump
    pub async fn close(mut self) -> Result<(), BleError> {
        self.stop_notifications();
        self.peripheral
            .disconnect()
            .await
            .map_err(BleError::btleplug("disconnect"))?;
        info!("Disconnected from {}", self.peripheral.address());
        Ok(())
    }
}

impl Drop for BleConnection {
    fn drop(&mut self) {
        self.stop_notifications();
    }
}
