//! Discovery and connection state machine
//!
//! [`Link`] owns every piece of per-connection state and is the only thing
//! that mutates it. Each [`GattEvent`] is applied by [`Link::handle_event`];
//! [`Link::run`] feeds events from the collaborator's channel one at a time.
//!
//! Any disconnect throws away the connection, the selection, the transfer
//! session and the reassembly buffer, then scanning starts again. There is
//! no other recovery path.

use smallvec::SmallVec;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::errors::{FrameError, Result, TransportError};
use crate::gatt::{EventReceiver, GattClient, GattEvent, GattStatus};
use crate::protocol::frame::Response;
use crate::protocol::reassembly::ReassemblyBuffer;
use crate::protocol::selector::{select_characteristics, CharacteristicSelection, DiscoveredService};
use crate::protocol::transfer::{TransferAction, TransferSession, TransferStatus};
use crate::types::{Payload, PeripheralIdentity, ServiceRange};

/// Value written to the CCC descriptor to enable notifications
const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// Inline storage for discovered services; `max_services` is the real bound
const INLINE_SERVICES: usize = 16;

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Progress of the MTU exchange on an open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtuState {
    Pending,
    /// Exchanged or given up; service discovery is running
    Done,
}

/// Lifecycle of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting(PeripheralIdentity),
    Connected(MtuState),
    ServicesDiscovered,
    CharacteristicsSelected,
    NotificationsRegistering,
    NotificationsReady,
}

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

/// Connection owner and transfer driver for one peripheral at a time
pub struct Link<C: GattClient> {
    client: C,
    config: LinkConfig,
    state: LinkState,
    scanning: bool,
    peer: Option<PeripheralIdentity>,
    services: SmallVec<[ServiceRange; INLINE_SERVICES]>,
    selection: Option<CharacteristicSelection>,
    notifications_ready: bool,
    reassembly: ReassemblyBuffer,
    transfer: TransferSession,
    status_tx: watch::Sender<TransferStatus>,
    outcome_tx: watch::Sender<Option<TransferStatus>>,
}

impl<C: GattClient> Link<C> {
    /// Create an idle link that will stream `payload`
    pub fn new(client: C, config: LinkConfig, payload: Payload) -> Result<Self> {
        config.validate()?;
        let transfer = TransferSession::new(
            payload,
            config.request_buffer_capacity,
            config.max_chunk_retries,
        );
        let (status_tx, _) = watch::channel(transfer.status());
        let (outcome_tx, _) = watch::channel(None);

        Ok(Self {
            reassembly: ReassemblyBuffer::new(config.reassembly_capacity),
            client,
            config,
            state: LinkState::Idle,
            scanning: false,
            peer: None,
            services: SmallVec::new(),
            selection: None,
            notifications_ready: false,
            transfer,
            status_tx,
            outcome_tx,
        })
    }

    /// Subscribe to transfer progress
    ///
    /// Progress restarts at `Idle` on every new connection.
    pub fn status(&self) -> watch::Receiver<TransferStatus> {
        self.status_tx.subscribe()
    }

    /// Subscribe to the most recent finished transfer
    ///
    /// Set whenever a transfer completes, aborts or exhausts its retries, and
    /// kept across disconnects.
    pub fn outcome(&self) -> watch::Receiver<Option<TransferStatus>> {
        self.outcome_tx.subscribe()
    }

    /// Begin scanning for the target
    pub async fn start(&mut self) {
        self.start_scan().await;
    }

    /// Start scanning and process events until the channel closes
    pub async fn run(&mut self, mut events: EventReceiver) {
        self.start().await;
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("Event channel closed, link stopped");
    }

    /// Apply one collaborator event
    pub async fn handle_event(&mut self, event: GattEvent) {
        debug!("Event {} in state {:?}", event.name(), self.state);
        match event {
            GattEvent::Advertisement {
                identity,
                complete_name,
                short_name,
            } => {
                self.on_advertisement(identity, complete_name.as_deref(), short_name.as_deref())
                    .await
            }
            GattEvent::ConnectionOpened { identity } => self.on_connection_opened(identity).await,
            GattEvent::ConnectionFailed { reason } => self.on_connection_failed(&reason).await,
            GattEvent::MtuExchanged { status, mtu } => self.on_mtu_exchanged(status, mtu).await,
            GattEvent::ServiceDiscovered(range) => self.on_service_discovered(range),
            GattEvent::DiscoveryComplete { status } => self.on_discovery_complete(status).await,
            GattEvent::DescriptorWritten { handle, status } => {
                self.on_descriptor_written(handle, status).await
            }
            GattEvent::CharacteristicWritten { handle, status } => {
                if let GattStatus::Failure(reason) = status {
                    error!("Write error on 0x{:04X}: {}", handle, reason);
                }
            }
            GattEvent::Notification { handle, value } => self.on_notification(handle, &value).await,
            GattEvent::Disconnected { reason } => self.on_disconnected(reason.as_deref()).await,
        }
    }

    // ------------------------------------------------------------------------
    // Scanning and connection
    // ------------------------------------------------------------------------

    async fn start_scan(&mut self) {
        if self.scanning {
            self.state = LinkState::Scanning;
            return;
        }
        match self.client.start_scan().await {
            Ok(()) => {
                self.scanning = true;
                self.state = LinkState::Scanning;
                info!("Started BLE scan for '{}'", self.config.name_prefix);
            }
            Err(e) => error!("Failed to start scan: {}", e),
        }
    }

    fn matches_prefix(&self, name: Option<&str>) -> bool {
        name.is_some_and(|name| name.starts_with(&self.config.name_prefix))
    }

    async fn on_advertisement(
        &mut self,
        identity: PeripheralIdentity,
        complete_name: Option<&str>,
        short_name: Option<&str>,
    ) {
        if self.state != LinkState::Scanning {
            return;
        }
        if !self.matches_prefix(complete_name) && !self.matches_prefix(short_name) {
            return;
        }

        info!("Found target device {}", identity);
        self.peer = Some(identity);
        self.state = LinkState::Connecting(identity);

        if let Err(e) = self.client.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        self.scanning = false;

        if let Err(e) = self.client.connect(identity).await {
            error!("Failed to open connection: {}", e);
            self.peer = None;
            self.state = LinkState::Idle;
            self.start_scan().await;
        }
    }

    async fn on_connection_failed(&mut self, reason: &str) {
        if !matches!(self.state, LinkState::Connecting(_)) {
            debug!("Ignoring connection failure outside of connecting: {}", reason);
            return;
        }
        error!("Connection failed: {}", reason);
        self.peer = None;
        self.state = LinkState::Idle;
        self.start_scan().await;
    }

    async fn on_connection_opened(&mut self, identity: PeripheralIdentity) {
        if !matches!(self.state, LinkState::Connecting(_)) {
            warn!("Unexpected connection to {} in state {:?}", identity, self.state);
            return;
        }

        self.reset_connection_state();
        self.peer = Some(identity);
        self.state = LinkState::Connected(MtuState::Pending);
        info!("Connected to {}", identity);

        if let Err(e) = self.client.negotiate_mtu().await {
            warn!("MTU request failed ({}), continue with default MTU", e);
            self.state = LinkState::Connected(MtuState::Done);
            self.discover_services().await;
        }
    }

    async fn on_mtu_exchanged(&mut self, status: GattStatus, mtu: Option<u16>) {
        if self.state != LinkState::Connected(MtuState::Pending) {
            return;
        }
        match (status, mtu) {
            (GattStatus::Success, Some(mtu)) => info!("Configured MTU={}", mtu),
            (GattStatus::Success, None) => info!("MTU exchange complete"),
            (GattStatus::Failure(reason), _) => warn!("MTU config failed: {}", reason),
        }
        self.state = LinkState::Connected(MtuState::Done);
        self.discover_services().await;
    }

    async fn discover_services(&mut self) {
        if let Err(e) = self.client.discover_services().await {
            error!("Service search could not start: {}", e);
        }
    }

    // ------------------------------------------------------------------------
    // Service discovery and selection
    // ------------------------------------------------------------------------

    fn on_service_discovered(&mut self, range: ServiceRange) {
        if self.state != LinkState::Connected(MtuState::Done) {
            return;
        }
        if self.services.len() >= self.config.max_services {
            warn!(
                "Service list full ({}), dropping {}",
                self.config.max_services, range
            );
            return;
        }
        info!("Service[{}] range {}", self.services.len(), range);
        self.services.push(range);
    }

    async fn on_discovery_complete(&mut self, status: GattStatus) {
        if self.state != LinkState::Connected(MtuState::Done) {
            return;
        }
        if let GattStatus::Failure(reason) = &status {
            error!("Service search failed: {}", reason);
            return;
        }
        if self.services.is_empty() {
            error!("Service search found no services");
            return;
        }
        self.state = LinkState::ServicesDiscovered;

        let mut discovered = Vec::with_capacity(self.services.len());
        for range in &self.services {
            match self.client.characteristics(range) {
                Ok(characteristics) => discovered.push(DiscoveredService::new(*range, characteristics)),
                Err(e) => warn!("Characteristics of {} unavailable: {}", range, e),
            }
        }

        let Some(selection) = select_characteristics(&discovered) else {
            error!("No write-capable characteristic found");
            return;
        };

        info!(
            "Selected service {:04X}..{:04X} write=0x{:04X} notify=0x{:04X}",
            selection.service_start,
            selection.service_end,
            selection.write_handle,
            selection.notify_handle.unwrap_or(0)
        );
        self.selection = Some(selection);
        self.state = LinkState::CharacteristicsSelected;

        match selection.notify_handle {
            Some(notify_handle) => self.enable_notifications(notify_handle).await,
            None => error!("No notify/indicate characteristic in selected service"),
        }
    }

    async fn enable_notifications(&mut self, notify_handle: u16) {
        let descriptors = match self.client.descriptors(notify_handle) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                error!("Descriptor read failed: {}", e);
                return;
            }
        };
        let Some(ccc) = descriptors.iter().find(|d| d.is_client_config()) else {
            error!("Could not find CCC descriptor");
            return;
        };

        if let Some(selection) = self.selection.as_mut() {
            selection.ccc_handle = Some(ccc.handle);
        }
        match self
            .client
            .write_descriptor(ccc.handle, &ENABLE_NOTIFICATIONS)
            .await
        {
            Ok(()) => self.state = LinkState::NotificationsRegistering,
            Err(e) => error!("Failed to enable notifications: {}", e),
        }
    }

    async fn on_descriptor_written(&mut self, handle: u16, status: GattStatus) {
        let ccc_handle = self.selection.and_then(|s| s.ccc_handle);
        if self.state != LinkState::NotificationsRegistering || ccc_handle != Some(handle) {
            return;
        }
        if let GattStatus::Failure(reason) = status {
            error!("Enabling notifications failed: {}", reason);
            return;
        }

        self.notifications_ready = true;
        self.state = LinkState::NotificationsReady;
        self.reassembly.reset();
        let action = self.transfer.begin_handshake();
        self.apply(action).await;
    }

    // ------------------------------------------------------------------------
    // Transfer
    // ------------------------------------------------------------------------

    async fn on_notification(&mut self, handle: u16, value: &[u8]) {
        if !self.notifications_ready {
            return;
        }
        if self.selection.and_then(|s| s.notify_handle) != Some(handle) {
            debug!("Ignoring notification from 0x{:04X}", handle);
            return;
        }
        debug!("notify fragment: {}", hex::encode(value));

        let frame = match self.reassembly.push(value) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                warn!("Dropping partial response: {}", e);
                return;
            }
        };

        match Response::decode(&frame) {
            Ok(response) => {
                let action = self.transfer.on_response(response);
                self.apply(action).await;
            }
            Err(FrameError::ShortFrame { len }) => {
                warn!("Ignored short notification ({} bytes)", len)
            }
            Err(e) => warn!("{}", e),
        }
    }

    async fn apply(&mut self, action: TransferAction) {
        match action {
            TransferAction::Transmit(frame) | TransferAction::Retransmit(frame) => {
                debug!("frame: {}", hex::encode(&frame));
                if let Err(e) = self.write_frame(&frame).await {
                    error!("Failed to send frame: {}", e);
                }
            }
            TransferAction::Complete | TransferAction::Stop => {
                let status = self.transfer.status();
                if status.phase.is_terminal() {
                    self.outcome_tx.send_replace(Some(status));
                }
            }
            TransferAction::Ignore => {}
        }
        self.status_tx.send_replace(self.transfer.status());
    }

    /// Write a frame in fixed-size slices, pausing between slices
    async fn write_frame(&mut self, frame: &[u8]) -> core::result::Result<(), TransportError> {
        let write_handle = match (self.state, self.selection) {
            (LinkState::NotificationsReady, Some(selection)) => selection.write_handle,
            _ => return Err(TransportError::NotConnected),
        };

        for (index, slice) in frame.chunks(self.config.write_slice_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.write_slice_delay).await;
            }
            self.client.write_characteristic(write_handle, slice).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------------

    async fn on_disconnected(&mut self, reason: Option<&str>) {
        info!(
            "Disconnected ({}), restarting scan",
            reason.unwrap_or("no reason given")
        );
        self.reset_connection_state();
        self.peer = None;
        self.state = LinkState::Idle;
        self.start_scan().await;
    }

    fn reset_connection_state(&mut self) {
        self.services.clear();
        self.selection = None;
        self.notifications_ready = false;
        self.transfer.reset();
        self.reassembly.reset();
        self.status_tx.send_replace(self.transfer.status());
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn peer(&self) -> Option<PeripheralIdentity> {
        self.peer
    }

    pub fn services(&self) -> &[ServiceRange] {
        &self.services
    }

    pub fn selection(&self) -> Option<CharacteristicSelection> {
        self.selection
    }

    pub fn transfer(&self) -> &TransferSession {
        &self.transfer
    }

    pub fn reassembly(&self) -> &ReassemblyBuffer {
        &self.reassembly
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }
}
