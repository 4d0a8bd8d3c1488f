//! Adapter setup, scanning and central event pump
//!
//! Every advertisement seen while scanning is forwarded to the link as a
//! [`GattEvent::Advertisement`]; the link decides whether it is the target.
//! Peripherals are remembered by address so a later `connect` can find the
//! platform handle again.

use std::collections::HashMap;
use std::sync::Arc;

use btleplug::api::{
    AddressType as BtAddressType, Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tf1_core::{AddressType, BdAddr, EventSender, GattEvent, PeripheralIdentity};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::config::BleConfig;
use crate::error::BleError;

/// Peripherals seen while scanning, keyed by address
pub type SeenPeripherals = Arc<RwLock<HashMap<BdAddr, Peripheral>>>;

/// Platform id of the peripheral the link is connected to
pub type ConnectedPeripheral = Arc<RwLock<Option<PeripheralId>>>;

// ----------------------------------------------------------------------------
// Discovery Implementation
// ----------------------------------------------------------------------------

/// Handles the adapter, scanning and central events
pub struct BleDiscovery {
    config: BleConfig,
    adapter: Option<Adapter>,
    seen: SeenPeripherals,
    event_task: Option<JoinHandle<()>>,
}

impl BleDiscovery {
    pub fn new(config: BleConfig) -> Self {
        Self {
            config,
            adapter: None,
            seen: Arc::new(RwLock::new(HashMap::new())),
            event_task: None,
        }
    }

    /// Initialize BLE adapter
    pub async fn initialize_adapter(&mut self) -> Result<(), BleError> {
        let manager = Manager::new()
            .await
            .map_err(BleError::btleplug("create manager"))?;
        let mut adapters = manager
            .adapters()
            .await
            .map_err(BleError::btleplug("list adapters"))?;

        if self.config.adapter_index >= adapters.len() {
            return Err(BleError::AdapterNotAvailable);
        }
        let adapter = adapters.swap_remove(self.config.adapter_index);
        match adapter.adapter_info().await {
            Ok(name) => info!("BLE adapter initialized: {}", name),
            Err(_) => info!("BLE adapter initialized"),
        }
        self.adapter = Some(adapter);
        Ok(())
    }

    pub fn adapter(&self) -> Result<&Adapter, BleError> {
        self.adapter.as_ref().ok_or(BleError::AdapterNotAvailable)
    }

    /// Spawn the task translating central events into link events
    pub async fn start_event_pump(
        &mut self,
        events: EventSender,
        connected: ConnectedPeripheral,
    ) -> Result<(), BleError> {
        let adapter = self.adapter()?.clone();
        let mut stream = adapter
            .events()
            .await
            .map_err(BleError::btleplug("subscribe to adapter events"))?;
        let seen = Arc::clone(&self.seen);

        self.event_task = Some(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if let Err(e) = process_central_event(&adapter, event, &seen, &connected, &events).await {
                    debug!("Central event dropped: {}", e);
                }
                if events.is_closed() {
                    break;
                }
            }
            debug!("Central event pump ended");
        }));
        Ok(())
    }

    /// Start scanning without a service filter
    pub async fn start_scanning(&self) -> Result<(), BleError> {
        self.adapter()?
            .start_scan(ScanFilter::default())
            .await
            .map_err(BleError::btleplug("start scan"))?;
        info!("Started BLE scanning");
        Ok(())
    }

    pub async fn stop_scanning(&self) -> Result<(), BleError> {
        self.adapter()?
            .stop_scan()
            .await
            .map_err(BleError::btleplug("stop scan"))?;
        debug!("Stopped BLE scanning");
        Ok(())
    }

    /// Platform peripheral last seen at `address`
    pub async fn peripheral(&self, address: BdAddr) -> Result<Peripheral, BleError> {
        self.seen
            .read()
            .await
            .get(&address)
            .cloned()
            .ok_or(BleError::PeripheralNotFound(address))
    }
}

impl Drop for BleDiscovery {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Event Translation
// ----------------------------------------------------------------------------

async fn process_central_event(
    adapter: &Adapter,
    event: CentralEvent,
    seen: &SeenPeripherals,
    connected: &ConnectedPeripheral,
    events: &EventSender,
) -> Result<(), BleError> {
    match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            let peripheral = adapter
                .peripheral(&id)
                .await
                .map_err(BleError::btleplug("look up peripheral"))?;
            let Some(properties) = peripheral
                .properties()
                .await
                .map_err(BleError::btleplug("read properties"))?
            else {
                return Ok(());
            };

            let identity = PeripheralIdentity::new(
                BdAddr::new(properties.address.into_inner()),
                map_address_type(properties.address_type),
            );
            trace!("Advertisement from {} ({:?})", identity, properties.local_name);
            seen.write().await.insert(identity.address, peripheral);

            // btleplug merges complete and shortened local names
            let _ = events.send(GattEvent::Advertisement {
                identity,
                complete_name: properties.local_name,
                short_name: None,
            });
        }
        CentralEvent::DeviceDisconnected(id) => {
            let mut connected = connected.write().await;
            if connected.as_ref() == Some(&id) {
                *connected = None;
                info!("Peripheral disconnected");
                let _ = events.send(GattEvent::Disconnected {
                    reason: Some("peripheral disconnected".to_string()),
                });
            }
        }
        _ => {}
    }
    Ok(())
}

fn map_address_type(address_type: Option<BtAddressType>) -> AddressType {
    match address_type {
        Some(BtAddressType::Random) => AddressType::Random,
        _ => AddressType::Public,
    }
}
