//! Error types for the CrossComm protocol
//!
//! This module contains the error types raised by the core crate: codec errors
//! while turning typed content into an envelope payload, envelope errors while
//! decoding wire frames, store errors from the object-store collaborator, and
//! transfer errors from the offload path. `CrossCommError` unifies them.

use std::path::PathBuf;

use crate::envelope::MessageKind;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors raised while encoding or decoding envelope content
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Payload for kind {kind} must be a JSON object")]
    NotAnObject { kind: MessageKind },
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Content of type {content} cannot be sent as {kind}")]
    UnsupportedContent {
        kind: MessageKind,
        content: &'static str,
    },
    #[error("Kind {kind} carries a path and is handled by the transfer offload")]
    TransferKind { kind: MessageKind },
}

/// Errors raised while decoding a wire frame into an envelope
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unknown message kind: {kind}")]
    UnknownKind { kind: String },
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors raised by an object store implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Object not found: {key}")]
    NotFound { key: String },
    #[error("Invalid object key: {key}")]
    InvalidKey { key: String },
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store backend error: {reason}")]
    Backend { reason: String },
}

/// Errors raised while moving a payload to or from the object store
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("File transfer requires store configuration")]
    StoreNotConfigured,
    #[error("File or directory does not exist: {}", path.display())]
    PathNotFound { path: PathBuf },
    #[error("Expected a directory for {kind} message: {}", path.display())]
    ExpectedDirectory { kind: MessageKind, path: PathBuf },
    #[error("Expected a regular file for {kind} message: {}", path.display())]
    ExpectedFile { kind: MessageKind, path: PathBuf },
    #[error("Kind {kind} does not carry a transfer payload")]
    NotTransferKind { kind: MessageKind },
    #[error("Folder upload failed: none of {failed} files were uploaded")]
    NothingUploaded { failed: usize },
    #[error("Store key {key} has no file name")]
    InvalidStoreKey { key: String },
    #[error("Store key {key} is not a folder prefix")]
    InvalidFolderPrefix { key: String },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the CrossComm protocol
#[derive(Debug, thiserror::Error)]
pub enum CrossCommError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
