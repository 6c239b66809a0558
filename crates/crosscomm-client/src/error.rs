//! Error types for the relay client

use crosscomm_core::{CodecError, CrossCommError, EnvelopeError, StoreError, TransferError};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Errors raised by the frame transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Failed to send frame: {reason}")]
    SendFailed { reason: String },

    #[error("Failed to receive frame: {reason}")]
    ReceiveFailed { reason: String },

    #[error("Connection closed")]
    Closed,

    #[error("Timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Errors raised while loading or validating client configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Loading(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Configuration file error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Failed to open object store: {0}")]
    Store(#[from] StoreError),
}

// ----------------------------------------------------------------------------
// Client Errors
// ----------------------------------------------------------------------------

/// Errors surfaced by [`crate::CrossCommClient`] operations
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Not connected to relay server")]
    NotConnected,

    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No response within {duration_ms}ms")]
    ResponseTimeout { duration_ms: u64 },

    #[error("Response channel dropped before a reply arrived")]
    ResponseDropped,
}

impl From<CrossCommError> for ClientError {
    fn from(err: CrossCommError) -> Self {
        match err {
            CrossCommError::Codec(e) => ClientError::Codec(e),
            CrossCommError::Envelope(e) => ClientError::Envelope(e),
            CrossCommError::Transfer(e) => ClientError::Transfer(e),
            CrossCommError::Store(e) => ClientError::Transfer(TransferError::Store(e)),
        }
    }
}
