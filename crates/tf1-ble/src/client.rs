//! [`GattClient`] implementation over btleplug

use std::sync::Arc;

use async_trait::async_trait;
use tf1_core::{
    CharacteristicInfo, DescriptorInfo, EventSender, GattClient, GattEvent, GattStatus,
    PeripheralIdentity, ServiceRange, TransportError,
};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::config::BleConfig;
use crate::connection::BleConnection;
use crate::discovery::{BleDiscovery, ConnectedPeripheral};
use crate::error::BleError;

// ----------------------------------------------------------------------------
// BLE Client
// ----------------------------------------------------------------------------

/// GATT client driving one adapter
///
/// Operations complete inline against btleplug and then report their
/// outcome on the event channel, so every completion reaches the link
/// after the call that started it has returned.
pub struct BleClient {
    config: BleConfig,
    discovery: BleDiscovery,
    connection: Option<BleConnection>,
    connected: ConnectedPeripheral,
    events: EventSender,
}

impl BleClient {
    /// Open the configured adapter and start forwarding its events
    pub async fn new(config: BleConfig, events: EventSender) -> Result<Self, BleError> {
        let mut discovery = BleDiscovery::new(config.clone());
        discovery.initialize_adapter().await?;

        let connected: ConnectedPeripheral = Arc::new(RwLock::new(None));
        discovery
            .start_event_pump(events.clone(), Arc::clone(&connected))
            .await?;

        Ok(Self {
            config,
            discovery,
            connection: None,
            connected,
            events,
        })
    }

    fn emit(&self, event: GattEvent) {
        if self.events.send(event).is_err() {
            warn!("Event channel closed, completion dropped");
        }
    }

    fn connection(&self) -> Result<&BleConnection, BleError> {
        self.connection.as_ref().ok_or(BleError::NotConnected)
    }

    fn connection_mut(&mut self) -> Result<&mut BleConnection, BleError> {
        self.connection.as_mut().ok_or(BleError::NotConnected)
    }
}

#[async_trait]
impl GattClient for BleClient {
    async fn start_scan(&mut self) -> Result<(), TransportError> {
        Ok(self.discovery.start_scanning().await?)
    }

    async fn stop_scan(&mut self) -> Result<(), TransportError> {
        Ok(self.discovery.stop_scanning().await?)
    }

    async fn connect(&mut self, identity: PeripheralIdentity) -> Result<(), TransportError> {
        let peripheral = self.discovery.peripheral(identity.address).await?;

        if let Some(stale) = self.connection.take() {
            if let Err(e) = stale.close().await {
                debug!("Closing stale connection failed: {}", e);
            }
        }

        match BleConnection::open(peripheral, self.config.connection_timeout()).await {
            Ok(connection) => {
                *self.connected.write().await = Some(connection.id());
                self.connection = Some(connection);
                self.emit(GattEvent::ConnectionOpened { identity });
            }
            Err(e) => {
                error!("Connection to {} failed: {}", identity, e);
                self.emit(GattEvent::ConnectionFailed {
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let connection = self.connection.take().ok_or(BleError::NotConnected)?;
        let result = connection.close().await;

        let was_connected = self.connected.write().await.take().is_some();
        if was_connected {
            self.emit(GattEvent::Disconnected {
                reason: Some("local disconnect".to_string()),
            });
        }
        Ok(result?)
    }

    async fn negotiate_mtu(&mut self) -> Result<(), TransportError> {
        self.connection()?;
        // btleplug negotiates the MTU itself and does not report it
        self.emit(GattEvent::MtuExchanged {
            status: GattStatus::Failure("unsupported".to_string()),
            mtu: None,
        });
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<(), TransportError> {
        let result = self
            .connection_mut()?
            .discover()
            .await
            .map(|table| table.services().to_vec());

        match result {
            Ok(services) => {
                for range in services {
                    self.emit(GattEvent::ServiceDiscovered(range));
                }
                self.emit(GattEvent::DiscoveryComplete {
                    status: GattStatus::Success,
                });
            }
            Err(e) => self.emit(GattEvent::DiscoveryComplete {
                status: GattStatus::Failure(e.to_string()),
            }),
        }
        Ok(())
    }

    fn characteristics(
        &self,
        service: &ServiceRange,
    ) -> Result<Vec<CharacteristicInfo>, TransportError> {
        Ok(self.connection()?.table().characteristics(service.start_handle)?)
    }

    fn descriptors(&self, characteristic: u16) -> Result<Vec<DescriptorInfo>, TransportError> {
        Ok(self.connection()?.table().descriptors(characteristic)?)
    }

    async fn write_characteristic(
        &mut self,
        handle: u16,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.connection()?.write(handle, value).await?;
        self.emit(GattEvent::CharacteristicWritten {
            handle,
            status: GattStatus::Success,
        });
        Ok(())
    }

    async fn write_descriptor(&mut self, handle: u16, value: &[u8]) -> Result<(), TransportError> {
        let events = self.events.clone();
        let result = self
            .connection_mut()?
            .write_descriptor(handle, value, &events)
            .await;
        if let Err(e) = &result {
            error!("Descriptor 0x{:04X} write failed: {}", handle, e);
        }
        self.emit(GattEvent::DescriptorWritten {
            handle,
            status: result.into(),
        });
        Ok(())
    }
}
