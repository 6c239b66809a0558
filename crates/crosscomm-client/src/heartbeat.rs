//! Heartbeat loop
//!
//! While a session is established, a heartbeat envelope is sent to the relay
//! every interval. The loop checks for cancellation and for its session still
//! being current at the top of each round, and wakes early when cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crosscomm_core::{Envelope, MessageKind, SERVER_ID};

use crate::client::ClientInner;
use crate::connection::{send_best_effort, SharedSink};

/// Payload of heartbeat, login and logout envelopes
pub(crate) const EMPTY_PAYLOAD: &str = "{}";

/// Cancellation handle of a running heartbeat loop
pub(crate) struct HeartbeatHandle {
    cancel: watch::Sender<bool>,
}

impl HeartbeatHandle {
    /// Signal the loop to exit; it finishes on its own
    pub(crate) fn stop(self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawn the heartbeat loop for session `generation`
pub(crate) fn spawn(
    inner: Arc<ClientInner>,
    generation: u64,
    sink: SharedSink,
    interval: Duration,
) -> HeartbeatHandle {
    let (cancel, mut cancelled) = watch::channel(false);

    tokio::spawn(async move {
        loop {
            if *cancelled.borrow() {
                break;
            }
            if !inner.connection.lock().await.is_current(generation) {
                break;
            }

            let beat = Envelope::new(
                &inner.client_id,
                SERVER_ID,
                MessageKind::Heartbeat,
                EMPTY_PAYLOAD,
            );
            send_best_effort(&sink, &beat).await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = cancelled.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Heartbeat loop for session {} stopped", generation);
    });

    HeartbeatHandle { cancel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CrossCommClient;
    use crate::config::ClientConfig;
    use crate::connection::ConnectionState;
    use crate::transport::memory::{MemoryConnection, MemoryConnector};
    use crate::transport::Frame;
    use futures::StreamExt;

    async fn client_with_interval(
        interval: Duration,
    ) -> (CrossCommClient, MemoryConnection) {
        let (connector, mut accepted) = MemoryConnector::pair();
        let config = ClientConfig::default()
            .with_client_id("pulse")
            .with_heartbeat_interval(interval);
        let client = CrossCommClient::builder(config)
            .with_connector(Arc::new(connector))
            .build()
            .unwrap();
        assert!(client.connect().await);
        let connection = accepted.next().await.unwrap();
        (client, connection)
    }

    fn heartbeats(frames: &[Frame]) -> Vec<Envelope> {
        frames
            .iter()
            .filter_map(|frame| frame.decode().ok())
            .filter(|envelope| envelope.kind() == MessageKind::Heartbeat)
            .collect()
    }

    #[tokio::test]
    async fn test_heartbeats_repeat_until_disconnect() {
        let (client, mut connection) = client_with_interval(Duration::from_secs(1)).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let beats = heartbeats(&connection.drain_frames());
        assert!(
            (2..=4).contains(&beats.len()),
            "expected about 3 heartbeats, got {}",
            beats.len()
        );
        for beat in &beats {
            assert_eq!(beat.to_client_id(), SERVER_ID);
            assert_eq!(beat.from_client_id(), "pulse");
            assert_eq!(beat.payload(), EMPTY_PAYLOAD);
        }

        client.disconnect().await;
        connection.drain_frames();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(heartbeats(&connection.drain_frames()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_heartbeat_keeps_session() {
        let (client, mut connection) = client_with_interval(Duration::from_secs(1)).await;
        connection.close_outbound();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(client.state().await, ConnectionState::Connected);

        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }
}
