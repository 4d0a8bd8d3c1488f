//! Error handling for the TF1 CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("TF1 link error: {0}")]
    Link(#[from] tf1_core::Tf1Error),

    #[error("BLE error: {0}")]
    Ble(#[from] tf1_ble::BleError),

    #[error("Frame error: {0}")]
    Frame(#[from] tf1_core::FrameError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transfer did not complete: {0}")]
    Transfer(String),

    #[error("Link stopped before the transfer finished")]
    LinkStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
