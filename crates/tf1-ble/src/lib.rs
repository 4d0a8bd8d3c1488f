//! Bluetooth Low Energy client for the TF1 link
//!
//! This crate provides [`BleClient`], a btleplug implementation of the
//! `GattClient` trait from `tf1-core`.
//!
//! ## Architecture
//!
//! - [`config`] - adapter selection and connection timeout
//! - [`error`] - errors specific to the btleplug client
//! - [`attributes`] - synthetic handle numbering for discovered attributes
//! - [`discovery`] - adapter setup, scanning and central events
//! - [`connection`] - connection, writes and the notification pump
//! - [`client`] - the `GattClient` implementation tying them together
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tf1_ble::{BleClient, BleConfig};
//! use tf1_core::{event_channel, Link, LinkConfig, Payload};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (events_tx, events_rx) = event_channel();
//! let client = BleClient::new(BleConfig::default(), events_tx).await?;
//!
//! let payload = Payload::from_file("payload.bin")?;
//! let mut link = Link::new(client, LinkConfig::default(), payload)?;
//! link.run(events_rx).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Notes
//!
//! btleplug hides ATT handles and negotiates the MTU on its own. Handles are
//! therefore synthetic, and MTU negotiation always completes with an
//! "unsupported" status, after which the link carries on with discovery.

mod attributes;
mod client;
mod config;
mod connection;
mod discovery;
mod error;

// Public API exports
pub use attributes::AttributeTable;
pub use client::BleClient;
pub use config::BleConfig;
pub use error::BleError;
