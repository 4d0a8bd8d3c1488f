//! TF1 CLI configuration
//!
//! A single TOML file with optional `[link]`, `[ble]` and `[log]` tables.
//! Missing tables and fields fall back to their defaults; command-line flags
//! override whatever the file says.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tf1_ble::BleConfig;
use tf1_core::LinkConfig;

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the TF1 CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Link and transfer settings
    pub link: LinkConfig,
    /// Adapter settings
    pub ble: BleConfig,
    /// Logging settings
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    pub fn max_level(&self) -> Result<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| CliError::Config(format!("Unknown log level: {}", self.level)))
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.link.validate()?;
        self.log.max_level()?;
        Ok(())
    }
}
