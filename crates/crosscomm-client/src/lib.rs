//! CrossComm relay client
//!
//! Async client for the CrossComm relay: one persistent connection to the
//! relay server, a heartbeat loop keeping it alive, a receive loop routing
//! inbound envelopes to filtered listeners, and correlated peer-list queries.
//! File, image and folder payloads travel through the object store configured
//! on the client (see [`crosscomm_core::offload`]).
//!
//! ```no_run
//! use std::time::Duration;
//! use crosscomm_client::{ClientConfig, CrossCommClient, ListenerFilter};
//! use crosscomm_core::{MessageKind, BROADCAST_ID};
//!
//! # async fn demo() -> Result<(), crosscomm_client::ClientError> {
//! let client = CrossCommClient::new(ClientConfig::new("localhost", 9898))?;
//! client
//!     .add_listener(ListenerFilter::any().kind(MessageKind::Text), |envelope| async move {
//!         println!("{}: {}", envelope.from_client_id(), envelope.payload());
//!     })
//!     .await;
//!
//! if client.connect().await {
//!     client.send_text("hello", BROADCAST_ID).await;
//!     if let Some(peers) = client.list_peers(true, Duration::from_secs(5)).await {
//!         println!("{} peers online", peers.total_count());
//!     }
//!     client.disconnect().await;
//! }
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod client;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod error;
pub mod listeners;
pub mod transport;

mod heartbeat;
mod receiver;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use client::{ClientBuilder, CrossCommClient};
pub use config::{ClientConfig, StoreBackend, StoreConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::ConnectionState;
pub use correlation::{PeerInfo, PeerList};
pub use error::{ClientError, ConfigError, TransportError};
pub use listeners::{handler, DispatchMode, Handler, ListenerFilter};
pub use transport::{Connector, Frame, FrameSink, FrameStream, WsConnector};

/// Result type for client operations
pub type Result<T> = core::result::Result<T, ClientError>;
