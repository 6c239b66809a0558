//! Error handling for the CrossComm CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Client error: {0}")]
    Client(#[from] crosscomm_client::ClientError),

    #[error("Configuration error: {0}")]
    Config(#[from] crosscomm_client::ConfigError),

    #[error("Could not connect to relay at {0}")]
    ConnectFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Peer list request failed")]
    PeerListFailed,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
