//! In-process relay server for client integration tests
//!
//! Speaks the relay side of the protocol over real WebSockets: registers
//! clients on login, routes envelopes by `to_client_id` (or to everyone for
//! broadcast), answers `list_clients` queries and records every envelope it
//! receives.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crosscomm_client::ClientConfig;
use crosscomm_core::{Envelope, MessageKind, BROADCAST_ID, SERVER_ID};

// ----------------------------------------------------------------------------
// Relay State
// ----------------------------------------------------------------------------

#[derive(Default)]
struct RelayState {
    /// Live connections by client id
    online: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
    /// Every client that ever logged in, with its online flag
    known: Mutex<BTreeMap<String, bool>>,
    /// Every envelope received, in arrival order
    received: Mutex<Vec<Envelope>>,
}

/// Relay listening on an ephemeral localhost port
pub struct TestRelay {
    pub port: u16,
    state: Arc<RelayState>,
    accept_task: JoinHandle<()>,
}

impl TestRelay {
    pub async fn start() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(RelayState::default());

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, accept_state.clone()));
            }
        });

        Self {
            port,
            state,
            accept_task,
        }
    }

    /// Client configuration pointing at this relay
    pub fn client_config(&self, client_id: &str) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.port).with_client_id(client_id)
    }

    /// Wait until every id in `ids` has logged in
    pub async fn wait_for_online(&self, ids: &[&str]) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            {
                let online = self.state.online.lock().await;
                if ids.iter().all(|id| online.contains_key(*id)) {
                    return;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "clients {:?} never logged in",
                ids
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until `id` is no longer connected
    pub async fn wait_for_offline(&self, id: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.state.online.lock().await.contains_key(id) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "client {} never went offline",
                id
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until the relay has read at least one `kind` envelope from `from`
    pub async fn wait_for_received(&self, from: &str, kind: MessageKind) -> Vec<Envelope> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let seen = self.received_from(from, kind).await;
            if !seen.is_empty() {
                return seen;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no {} envelope from {} reached the relay",
                kind,
                from
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Envelopes received so far
    pub async fn received(&self) -> Vec<Envelope> {
        self.state.received.lock().await.clone()
    }

    /// Received envelopes of `kind` sent by `from`
    pub async fn received_from(&self, from: &str, kind: MessageKind) -> Vec<Envelope> {
        self.received()
            .await
            .into_iter()
            .filter(|envelope| envelope.from_client_id() == from && envelope.kind() == kind)
            .collect()
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ----------------------------------------------------------------------------
// Connection Handling
// ----------------------------------------------------------------------------

async fn serve(stream: TcpStream, state: Arc<RelayState>) {
    let Ok(socket) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if write.send(message).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    let mut client_id: Option<String> = None;
    while let Some(Ok(message)) = read.next().await {
        let envelope = match message {
            Message::Text(text) => Envelope::from_json(&text),
            Message::Binary(data) => Envelope::from_json_bytes(&data),
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(envelope) = envelope else {
            continue;
        };
        state.received.lock().await.push(envelope.clone());

        match envelope.kind() {
            MessageKind::Login => {
                let id = envelope.from_client_id().to_string();
                state.online.lock().await.insert(id.clone(), tx.clone());
                state.known.lock().await.insert(id.clone(), true);
                client_id = Some(id);
            }
            MessageKind::Logout => {
                go_offline(&state, envelope.from_client_id()).await;
                client_id = None;
            }
            MessageKind::Heartbeat => {}
            MessageKind::ListPeers => {
                let response = peer_list_response(&state, &envelope).await;
                let _ = tx.send(Message::Text(response));
            }
            _ => route(&state, &envelope).await,
        }
    }

    if let Some(id) = client_id {
        go_offline(&state, &id).await;
    }
    drop(tx);
    let _ = writer.await;
}

async fn go_offline(state: &RelayState, id: &str) {
    if let Some(online) = state.known.lock().await.get_mut(id) {
        *online = false;
    }
    state.online.lock().await.remove(id);
}

async fn route(state: &RelayState, envelope: &Envelope) {
    let Ok(text) = envelope.to_json() else {
        return;
    };
    let online = state.online.lock().await;
    if envelope.to_client_id() == BROADCAST_ID {
        for (id, peer) in online.iter() {
            if id != envelope.from_client_id() {
                let _ = peer.send(Message::Text(text.clone()));
            }
        }
    } else if let Some(peer) = online.get(envelope.to_client_id()) {
        let _ = peer.send(Message::Text(text));
    }
}

/// Response frame with an object `content`, echoing the request id
async fn peer_list_response(state: &RelayState, request: &Envelope) -> String {
    let filter: Value = serde_json::from_str(request.payload()).unwrap_or(Value::Null);
    let only_online = filter
        .get("only_show_online")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let clients: Vec<Value> = state
        .known
        .lock()
        .await
        .iter()
        .filter(|(_, online)| **online || !only_online)
        .map(|(id, online)| json!({"client_id": id, "online": online}))
        .collect();

    let total_count = clients.len();
    let mut content = json!({
        "clients": clients,
        "total_count": total_count,
    });
    if let Some(request_id) = filter.get("request_id") {
        content["request_id"] = request_id.clone();
    }

    json!({
        "msg_id": format!("{}_reply", request.id()),
        "from_client_id": SERVER_ID,
        "to_client_id": request.from_client_id(),
        "msg_type": "list_clients_response",
        "content": content,
        "timestamp": 0.0,
    })
    .to_string()
}
