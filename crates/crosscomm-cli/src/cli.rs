//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crosscomm_core::{MessageKind, BROADCAST_ID};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Relay server host
    #[arg(long)]
    pub host: Option<String>,

    /// Relay server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Client id; generated from the device id when omitted
    #[arg(long)]
    pub client_id: Option<String>,

    /// Directory used as a local object store, enabling file transfer
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every message received until Ctrl+C
    Listen {
        /// Root of the download directories for files, images and folders
        #[arg(short, long, default_value = "downloads")]
        downloads: PathBuf,
    },
    /// Send a single message and exit
    Send {
        /// Kind of message to send
        #[arg(short, long, value_enum, default_value_t = SendKind::Text)]
        kind: SendKind,
        /// Recipient client id
        #[arg(short, long, default_value = BROADCAST_ID)]
        to: String,
        /// Text, JSON document, or local path depending on the kind
        content: String,
    },
    /// List clients known to the relay
    Peers {
        /// Include offline clients
        #[arg(short, long)]
        all: bool,
        /// Seconds to wait for the relay's answer
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
    /// Read commands from stdin (text, json, file, image, folder, peers, quit)
    Interactive {
        /// Root of the download directories for files, images and folders
        #[arg(short, long, default_value = "downloads")]
        downloads: PathBuf,
    },
}

/// Message kinds the `send` command can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SendKind {
    Text,
    Json,
    File,
    Image,
    Folder,
}

impl From<SendKind> for MessageKind {
    fn from(kind: SendKind) -> Self {
        match kind {
            SendKind::Text => MessageKind::Text,
            SendKind::Json => MessageKind::Json,
            SendKind::File => MessageKind::File,
            SendKind::Image => MessageKind::Image,
            SendKind::Folder => MessageKind::Folder,
        }
    }
}
