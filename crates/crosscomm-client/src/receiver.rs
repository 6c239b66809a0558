//! Receive loop
//!
//! Pulls frames off the transport in arrival order, decodes them into
//! envelopes and routes each one: peer-list responses complete their waiting
//! request, heartbeats and echoes of our own envelopes are dropped, transfer
//! envelopes are downloaded when a listener asked for it, and everything else
//! is fanned out to the listeners.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crosscomm_core::{Envelope, MessageKind};

use crate::client::ClientInner;
use crate::correlation::PeerList;
use crate::error::TransportError;
use crate::transport::FrameStream;

/// Drive `stream` until the link drops, then mark session `generation` lost
pub(crate) async fn run(inner: Arc<ClientInner>, generation: u64, mut stream: FrameStream) {
    while let Some(next) = stream.next().await {
        match next {
            Ok(frame) => match frame.decode() {
                Ok(envelope) => process_received(&inner, envelope).await,
                Err(e) => warn!("Dropping malformed frame: {}", e),
            },
            Err(TransportError::Closed) => {
                info!("Relay closed the connection");
                break;
            }
            Err(e) => {
                warn!("Receive loop ending: {}", e);
                break;
            }
        }
    }

    if inner.connection.lock().await.mark_lost(generation) {
        warn!("Connection to relay lost; call connect() to reconnect");
    } else {
        debug!("Receive loop for session {} finished", generation);
    }
}

/// Route one inbound envelope
pub(crate) async fn process_received(inner: &ClientInner, envelope: Envelope) {
    match envelope.kind() {
        MessageKind::ListPeersResponse => {
            complete_peer_list(inner, &envelope).await;
            return;
        }
        MessageKind::Heartbeat => return,
        _ => {}
    }

    if envelope.from_client_id() == inner.client_id.as_str() {
        debug!("Ignoring echo of own envelope {}", envelope.id());
        return;
    }

    let envelope = localize_transfer(inner, envelope).await;
    inner
        .listeners
        .dispatch(&envelope, inner.config.dispatch_mode)
        .await;
}

async fn complete_peer_list(inner: &ClientInner, envelope: &Envelope) {
    match serde_json::from_str::<Value>(envelope.payload()) {
        Ok(value) => {
            if !inner.pending.complete(PeerList::new(value)).await {
                debug!("Peer list response {} had no waiting request", envelope.id());
            }
        }
        Err(e) => warn!("Dropping unparsable peer list response: {}", e),
    }
}

/// Download a transfer payload if some matching listener has a download dir
///
/// On any failure the envelope is delivered unchanged.
async fn localize_transfer(inner: &ClientInner, envelope: Envelope) -> Envelope {
    if !envelope.kind().is_transfer() || envelope.store_key().is_none() {
        return envelope;
    }
    let Some(download_dir) = inner.listeners.download_dir_for(&envelope).await else {
        info!(
            "No download directory for {} envelope {}; delivering store key only",
            envelope.kind(),
            envelope.id()
        );
        return envelope;
    };
    if !inner.offload.is_configured() {
        info!(
            "Received {} envelope {} but no object store is configured",
            envelope.kind(),
            envelope.id()
        );
        return envelope;
    }

    match inner.offload.localize(envelope.clone(), &download_dir).await {
        Ok(local) => local,
        Err(e) => {
            warn!(
                "Failed to download {} for envelope {}: {}",
                envelope.kind(),
                envelope.id(),
                e
            );
            envelope
        }
    }
}
