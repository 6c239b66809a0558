//! Frame transport
//!
//! The client talks to the relay through a [`Connector`] that yields a frame
//! sink and a frame stream. [`WsConnector`] is the production implementation
//! on top of `tokio-tungstenite`; [`memory::MemoryConnector`] is an in-process
//! pair of channels for tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crosscomm_core::{Envelope, EnvelopeError};

use crate::error::TransportError;

pub mod memory;

// ----------------------------------------------------------------------------
// Frames
// ----------------------------------------------------------------------------

/// One data frame on the relay connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Decode the UTF-8 JSON envelope carried by this frame
    pub fn decode(&self) -> Result<Envelope, EnvelopeError> {
        match self {
            Frame::Text(text) => Envelope::from_json(text),
            Frame::Binary(bytes) => Envelope::from_json_bytes(bytes),
        }
    }

    fn into_message(self) -> Message {
        match self {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        }
    }
}

/// Outbound half of a connection
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a connection; ends or yields an error when the link drops
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

// ----------------------------------------------------------------------------
// Connector Trait
// ----------------------------------------------------------------------------

/// Opens full-duplex connections to a relay URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}

// ----------------------------------------------------------------------------
// WebSocket Connector
// ----------------------------------------------------------------------------

/// WebSocket connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (socket, _response) =
            connect_async(url)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        debug!("WebSocket handshake with {} complete", url);

        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame.into_message())));

        // Ping/pong are answered by tungstenite itself and never surface here
        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data))),
                Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::ReceiveFailed {
                    reason: e.to_string(),
                })),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
