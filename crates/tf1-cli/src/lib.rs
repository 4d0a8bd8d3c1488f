//! TF1 CLI library
//!
//! Argument parsing, configuration loading and the command handlers behind
//! the `tf1` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use config::{AppConfig, LogConfig};
pub use error::{CliError, Result};
