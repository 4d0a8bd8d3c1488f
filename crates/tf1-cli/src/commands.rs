//! Command handlers for the TF1 CLI

use std::path::Path;

use tf1_ble::BleClient;
use tf1_core::protocol::frame::{encode_chunk, encode_handshake};
use tf1_core::{event_channel, GattClient, Link, Payload, TransferPhase, TransferStatus};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Send {
                payload,
                name_prefix,
                keep_running,
            } => Self::handle_send_command(config, &payload, name_prefix, keep_running).await,
            Commands::Frames {
                payload,
                chunk_size,
            } => Self::handle_frames_command(&config, &payload, chunk_size),
        }
    }

    /// Run the link until the payload is delivered, or until interrupted
    async fn handle_send_command(
        mut config: AppConfig,
        payload_path: &Path,
        name_prefix: Option<String>,
        keep_running: bool,
    ) -> Result<()> {
        if let Some(prefix) = name_prefix {
            config.link = config.link.with_name_prefix(prefix);
        }
        config.link.validate()?;

        let payload = Payload::from_file(payload_path)?;
        info!(
            "Loaded {} byte payload from {}",
            payload.len(),
            payload_path.display()
        );

        let (events_tx, events_rx) = event_channel();
        let client = BleClient::new(config.ble.clone(), events_tx).await?;
        let mut link = Link::new(client, config.link.clone(), payload)?;
        let status = link.status();
        let mut outcome_rx = link.outcome();

        let outcome = tokio::select! {
            _ = link.run(events_rx) => Err(CliError::LinkStopped),
            outcome = wait_for_transfer(&mut outcome_rx, keep_running) => outcome.map(Some),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                Ok(None)
            }
        };

        if link.peer().is_some() {
            if let Err(e) = link.client_mut().disconnect().await {
                warn!("Disconnect failed: {}", e);
            }
        }

        let status = outcome?.unwrap_or_else(|| *status.borrow());
        info!(
            "Transfer {:?}: {}/{} bytes acknowledged",
            status.phase, status.bytes_sent, status.total
        );
        Ok(())
    }

    /// Print the frames the link would send for a payload
    fn handle_frames_command(config: &AppConfig, payload_path: &Path, chunk_size: usize) -> Result<()> {
        let payload = Payload::from_file(payload_path)?;
        for line in frame_preview(&payload, chunk_size, config.link.request_buffer_capacity)? {
            println!("{}", line);
        }
        Ok(())
    }
}

/// Wait until the transfer finishes on some connection
///
/// With `keep_running` the link keeps serving reconnects, so this only
/// returns once the link itself goes away.
async fn wait_for_transfer(
    outcome: &mut watch::Receiver<Option<TransferStatus>>,
    keep_running: bool,
) -> Result<TransferStatus> {
    loop {
        outcome.changed().await.map_err(|_| CliError::LinkStopped)?;
        let Some(current) = *outcome.borrow_and_update() else {
            continue;
        };
        if keep_running {
            if current.phase == TransferPhase::Complete {
                info!("Transfer complete, waiting for the next connection");
            }
            continue;
        }
        match current.phase {
            TransferPhase::Complete => return Ok(current),
            TransferPhase::Aborted | TransferPhase::Exhausted => {
                return Err(CliError::Transfer(format!(
                    "{:?} after {}/{} bytes",
                    current.phase, current.bytes_sent, current.total
                )))
            }
            _ => {}
        }
    }
}

/// Hex lines for the handshake and every chunk frame of `payload`
pub fn frame_preview(payload: &Payload, chunk_size: usize, capacity: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(CliError::Config("chunk-size must be > 0".to_string()));
    }

    let mut lines = Vec::with_capacity(payload.len().div_ceil(chunk_size) + 1);
    let handshake = encode_handshake(payload.len(), capacity)?;
    lines.push(format!("handshake(cmd17): {}", hex::encode(handshake)));

    for (index, chunk) in payload.chunks(chunk_size).enumerate() {
        let sequence = u16::try_from(index + 1)
            .map_err(|_| CliError::Config("payload needs more than 65535 chunks".to_string()))?;
        let frame = encode_chunk(sequence, chunk, capacity)?;
        lines.push(format!("chunk {}(cmd18): {}", sequence, hex::encode(frame)));
    }
    Ok(lines)
}
