//! CrossComm Core Protocol Implementation
//!
//! This crate provides the wire-level types of the CrossComm relay protocol:
//! the [`Envelope`] exchanged with the relay server, the closed set of
//! [`MessageKind`]s, the content codec that maps typed payloads onto the
//! envelope's string payload, and the transfer offload that moves large
//! payloads (files, images, folders) through an external [`ObjectStore`].
//!
//! Nothing in this crate owns a socket. The connection, heartbeat and
//! dispatch machinery lives in `crosscomm-client`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod envelope;
pub mod errors;
pub mod offload;
pub mod store;
pub mod types;

mod walk;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use codec::{decode, encode, Content};
pub use envelope::{Envelope, MessageKind};
pub use errors::{CodecError, CrossCommError, EnvelopeError, StoreError, TransferError};
pub use offload::{DownloadReport, TransferOffload, UploadReport, DEFAULT_NAMESPACE};
pub use store::{LocalDirStore, MemoryStore, ObjectStore, SharedStore};
pub use types::{ClientId, BROADCAST_ID, SERVER_ID};

/// Result type used throughout the core crate
pub type Result<T> = core::result::Result<T, CrossCommError>;
