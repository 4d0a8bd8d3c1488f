//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream a payload file to the first matching peripheral
    Send {
        /// Payload file to transfer
        payload: PathBuf,
        /// Advertised name prefix of the target
        #[arg(short, long)]
        name_prefix: Option<String>,
        /// Keep serving reconnects after the first complete transfer
        #[arg(short, long)]
        keep_running: bool,
    },
    /// Print the handshake and chunk frames for a payload without a radio
    Frames {
        /// Payload file to frame
        payload: PathBuf,
        /// Payload bytes per chunk frame
        #[arg(long, default_value_t = 500)]
        chunk_size: usize,
    },
}
