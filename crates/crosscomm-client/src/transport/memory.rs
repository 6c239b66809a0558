//! In-process transport
//!
//! [`MemoryConnector`] hands every opened connection to the test as a
//! [`MemoryConnection`]: the test reads what the client wrote and injects
//! frames as if they came from the relay.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use crosscomm_core::Envelope;

use super::{Connector, Frame, FrameSink, FrameStream};
use crate::error::TransportError;

/// Connector whose connections are plain channels
#[derive(Clone)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<MemoryConnection>,
    refuse: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// New connector plus the receiver on which opened connections arrive
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<MemoryConnection>) {
        let (accepted, incoming) = mpsc::unbounded();
        let connector = Self {
            accepted,
            refuse: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        (connector, incoming)
    }

    /// Make subsequent connection attempts fail
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of times `connect` was called
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded::<Frame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded::<Result<Frame, TransportError>>();

        let connection = MemoryConnection {
            url: url.to_string(),
            outbound: outbound_rx,
            inbound: inbound_tx,
        };
        self.accepted
            .unbounded_send(connection)
            .map_err(|_| TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: "no acceptor".to_string(),
            })?;

        let sink = outbound_tx.sink_map_err(|e| TransportError::SendFailed {
            reason: e.to_string(),
        });
        Ok((Box::pin(sink), Box::pin(inbound_rx)))
    }
}

/// Server side of one in-process connection
pub struct MemoryConnection {
    pub url: String,
    outbound: mpsc::UnboundedReceiver<Frame>,
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
}

impl MemoryConnection {
    /// Next frame written by the client; `None` once the client closed its sink
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.outbound.next().await
    }

    /// Next envelope written by the client, skipping heartbeats
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        while let Some(frame) = self.next_frame().await {
            match frame.decode() {
                Ok(envelope) if envelope.kind() == crosscomm_core::MessageKind::Heartbeat => {}
                Ok(envelope) => return Some(envelope),
                Err(_) => {}
            }
        }
        None
    }

    /// Every frame already written by the client, without waiting
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Stop accepting frames from the client; its sends fail from now on
    pub fn close_outbound(&mut self) {
        self.outbound.close();
    }

    /// Deliver a raw frame to the client
    pub fn inject_frame(&self, frame: Frame) -> bool {
        self.inbound.unbounded_send(Ok(frame)).is_ok()
    }

    /// Deliver an envelope to the client as a text frame
    pub fn inject(&self, envelope: &Envelope) -> bool {
        match envelope.to_json() {
            Ok(text) => self.inject_frame(Frame::Text(text)),
            Err(_) => false,
        }
    }

    /// Simulate a transport failure on the client's receive side
    pub fn fail(&self, reason: &str) -> bool {
        self.inbound
            .unbounded_send(Err(TransportError::ReceiveFailed {
                reason: reason.to_string(),
            }))
            .is_ok()
    }

    /// End the client's inbound stream
    pub fn close(&self) {
        self.inbound.close_channel();
    }
}
