//! Request/response correlation for peer-list queries
//!
//! Each `list_clients` request registers a one-shot slot keyed by its message
//! id. The relay echoes that id as `request_id` in the response payload; a
//! response without one completes the oldest pending request.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

/// Payload key carrying the correlation id in both directions
pub const REQUEST_ID_FIELD: &str = "request_id";

// ----------------------------------------------------------------------------
// Peer List
// ----------------------------------------------------------------------------

/// One entry of a peer list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub client_id: String,
    /// Absent when the relay only reports online clients
    pub online: Option<bool>,
}

/// Relay answer to a list-peers query
#[derive(Debug, Clone, PartialEq)]
pub struct PeerList {
    raw: Value,
}

impl PeerList {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Reported `total_count`, or the number of listed clients
    pub fn total_count(&self) -> usize {
        self.raw
            .get("total_count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .unwrap_or_else(|| self.clients().len())
    }

    /// Listed clients; entries without a `client_id` are skipped
    pub fn clients(&self) -> Vec<PeerInfo> {
        let Some(entries) = self.raw.get("clients").and_then(Value::as_array) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(id) => Some(PeerInfo {
                    client_id: id.clone(),
                    online: None,
                }),
                Value::Object(fields) => {
                    let client_id = fields.get("client_id")?.as_str()?.to_string();
                    let online = fields.get("online").and_then(Value::as_bool);
                    Some(PeerInfo { client_id, online })
                }
                _ => None,
            })
            .collect()
    }

    /// Correlation id echoed by the relay, if any
    pub fn request_id(&self) -> Option<&str> {
        self.raw.get(REQUEST_ID_FIELD).and_then(Value::as_str)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }
}

// ----------------------------------------------------------------------------
// Pending Requests
// ----------------------------------------------------------------------------

/// Outstanding list-peers requests, oldest first
#[derive(Default)]
pub(crate) struct PendingRequests {
    slots: Mutex<VecDeque<(String, oneshot::Sender<PeerList>)>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `request_id` and return the receiver its response will arrive on
    pub(crate) async fn register(&self, request_id: &str) -> oneshot::Receiver<PeerList> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().await.push_back((request_id.to_string(), tx));
        rx
    }

    /// Route a response to its waiter; returns false when nobody was waiting
    ///
    /// Slots whose caller stopped waiting are discarded first, so an
    /// uncorrelated response reaches the oldest live request.
    pub(crate) async fn complete(&self, response: PeerList) -> bool {
        let mut slots = self.slots.lock().await;
        slots.retain(|(_, tx)| !tx.is_closed());
        let position = match response.request_id() {
            Some(id) => slots.iter().position(|(pending, _)| pending == id),
            None => (!slots.is_empty()).then_some(0),
        };
        let Some(index) = position else {
            debug!(
                "Dropping peer list response for unknown request {:?}",
                response.request_id()
            );
            return false;
        };
        match slots.remove(index) {
            Some((_, tx)) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Forget `request_id` after a timeout or failed send
    pub(crate) async fn cancel(&self, request_id: &str) {
        self.slots
            .lock()
            .await
            .retain(|(pending, _)| pending != request_id);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_peer_list_views() {
        let list = PeerList::new(json!({
            "clients": [
                {"client_id": "a", "online": true},
                {"client_id": "b", "online": false},
                {"name": "missing id"},
                "c"
            ],
            "total_count": 4
        }));
        assert_eq!(list.total_count(), 4);
        let clients = list.clients();
        assert_eq!(clients.len(), 3);
        assert_eq!(clients[1].online, Some(false));
        assert_eq!(clients[2].client_id, "c");

        let bare = PeerList::new(json!({"clients": [{"client_id": "x"}]}));
        assert_eq!(bare.total_count(), 1);
    }

    #[tokio::test]
    async fn test_responses_route_by_request_id() {
        let pending = PendingRequests::new();
        let first = pending.register("req-1").await;
        let second = pending.register("req-2").await;

        assert!(
            pending
                .complete(PeerList::new(json!({"request_id": "req-2", "total_count": 2})))
                .await
        );
        assert!(
            pending
                .complete(PeerList::new(json!({"request_id": "req-1", "total_count": 1})))
                .await
        );

        assert_eq!(first.await.unwrap().total_count(), 1);
        assert_eq!(second.await.unwrap().total_count(), 2);
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test]
    async fn test_uncorrelated_response_completes_oldest() {
        let pending = PendingRequests::new();
        let first = pending.register("req-1").await;
        let _second = pending.register("req-2").await;

        assert!(pending.complete(PeerList::new(json!({"total_count": 0}))).await);
        assert_eq!(first.await.unwrap().total_count(), 0);
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_does_not_starve_live_one() {
        let pending = PendingRequests::new();
        let abandoned = pending.register("req-1").await;
        drop(abandoned);
        let live = pending.register("req-2").await;

        assert!(pending.complete(PeerList::new(json!({"total_count": 1}))).await);
        assert_eq!(live.await.unwrap().total_count(), 1);
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_and_cancelled_requests_are_dropped() {
        let pending = PendingRequests::new();
        assert!(!pending.complete(PeerList::new(json!({}))).await);

        let _rx = pending.register("req-1").await;
        pending.cancel("req-1").await;
        assert!(
            !pending
                .complete(PeerList::new(json!({"request_id": "req-1"})))
                .await
        );
    }
}
