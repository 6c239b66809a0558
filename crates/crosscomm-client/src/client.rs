//! Relay client
//!
//! [`CrossCommClient`] is the public face of the crate. It owns one relay
//! session at a time and exposes the send, query and listener operations.
//! Fallible operations come in two flavours: `try_*` methods return a
//! [`ClientError`], while the plain methods log the error and report success
//! as `bool` / `Option`.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crosscomm_core::{
    encode, ClientId, CodecError, Content, Envelope, MessageKind, SharedStore, TransferOffload,
    SERVER_ID,
};

use crate::config::ClientConfig;
use crate::connection::{
    close_sink, send_best_effort, send_envelope, Connection, ConnectionState, Session, SharedSink,
};
use crate::correlation::{PeerList, PendingRequests, REQUEST_ID_FIELD};
use crate::error::{ClientError, TransportError};
use crate::heartbeat::{self, EMPTY_PAYLOAD};
use crate::listeners::{handler, Handler, ListenerFilter, ListenerRegistry};
use crate::receiver;
use crate::transport::{Connector, WsConnector};

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// State shared between the client handle and its background tasks
pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) client_id: ClientId,
    pub(crate) offload: TransferOffload,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) connection: Mutex<Connection>,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) pending: PendingRequests,
}

// ----------------------------------------------------------------------------
// Client Builder
// ----------------------------------------------------------------------------

/// Builder for [`CrossCommClient`]
pub struct ClientBuilder {
    config: ClientConfig,
    store: Option<SharedStore>,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            connector: None,
        }
    }

    /// Use `store` for transfers instead of the configured backend
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom transport connector
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Validate the configuration and create the client
    pub fn build(self) -> Result<CrossCommClient, ClientError> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => Some(store),
            None => self.config.store.build()?,
        };
        let offload = TransferOffload::new(store, self.config.store_namespace.clone());
        let client_id = self.config.resolve_client_id();
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector) as Arc<dyn Connector>);

        debug!(
            "Created client {} (transfers {})",
            client_id,
            if offload.is_configured() { "enabled" } else { "disabled" }
        );

        Ok(CrossCommClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                client_id,
                offload,
                connector,
                connection: Mutex::new(Connection::default()),
                listeners: ListenerRegistry::new(),
                pending: PendingRequests::new(),
            }),
        })
    }
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// Handle to a relay client; cheap to clone
#[derive(Clone)]
pub struct CrossCommClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for CrossCommClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossCommClient")
            .field("client_id", &self.inner.client_id)
            .field("server", &self.inner.config.server_url())
            .finish()
    }
}

impl CrossCommClient {
    /// Client over WebSocket with the store named in `config`
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn client_id(&self) -> &ClientId {
        &self.inner.client_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.connection.lock().await.state()
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn listener_count(&self) -> usize {
        self.inner.listeners.len().await
    }

    // ------------------------------------------------------------------------
    // Connection Lifecycle
    // ------------------------------------------------------------------------

    /// Connect and log in; true when a session is established
    pub async fn connect(&self) -> bool {
        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to connect to {}: {}", self.inner.config.server_url(), e);
                false
            }
        }
    }

    /// Connect and log in
    ///
    /// Succeeds immediately when already connected and fails with
    /// [`ClientError::AlreadyConnecting`] while another attempt is running.
    pub async fn try_connect(&self) -> Result<(), ClientError> {
        let generation = {
            let mut connection = self.inner.connection.lock().await;
            match connection.state() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting | ConnectionState::Disconnecting => {
                    return Err(ClientError::AlreadyConnecting)
                }
                ConnectionState::Disconnected => connection.begin_connect(),
            }
        };

        let result = self.open_session(generation).await;
        if result.is_err() {
            self.inner.connection.lock().await.abort_connect(generation);
        }
        result
    }

    async fn open_session(&self, generation: u64) -> Result<(), ClientError> {
        let url = self.inner.config.server_url();
        let connect_timeout = self.inner.config.connect_timeout();
        info!("Connecting to {} as {}", url, self.inner.client_id);

        let (sink, stream) = tokio::time::timeout(connect_timeout, self.inner.connector.connect(&url))
            .await
            .map_err(|_| TransportError::Timeout {
                duration_ms: connect_timeout.as_millis() as u64,
            })??;
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        let receiver = tokio::spawn(receiver::run(self.inner.clone(), generation, stream));

        let login = Envelope::new(
            &self.inner.client_id,
            SERVER_ID,
            MessageKind::Login,
            EMPTY_PAYLOAD,
        );
        if let Err(e) = send_envelope(&sink, &login).await {
            receiver.abort();
            close_sink(&sink).await;
            return Err(e);
        }

        let mut connection = self.inner.connection.lock().await;
        let session = Session {
            sink: sink.clone(),
            receiver,
            heartbeat: None,
        };
        if let Err(mut session) = connection.establish(generation, session) {
            drop(connection);
            session.stop_tasks();
            close_sink(&sink).await;
            return Err(TransportError::Closed.into());
        }
        let heartbeat = heartbeat::spawn(
            self.inner.clone(),
            generation,
            sink,
            self.inner.config.heartbeat_interval(),
        );
        connection.attach_heartbeat(heartbeat);

        info!("Connected to {} as {}", url, self.inner.client_id);
        Ok(())
    }

    /// Log out and close the connection; no-op when not connected
    pub async fn disconnect(&self) {
        let Some(mut session) = self.inner.connection.lock().await.begin_disconnect() else {
            debug!("disconnect() called while not connected");
            return;
        };

        if let Some(heartbeat) = session.heartbeat.take() {
            heartbeat.stop();
        }
        let logout = Envelope::new(
            &self.inner.client_id,
            SERVER_ID,
            MessageKind::Logout,
            EMPTY_PAYLOAD,
        );
        send_best_effort(&session.sink, &logout).await;
        close_sink(&session.sink).await;
        session.receiver.abort();

        self.inner.connection.lock().await.finish_disconnect();
        info!("Disconnected from relay");
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Send `content` as `kind` to `to`; false on any failure
    pub async fn send(&self, content: Content, kind: MessageKind, to: &str) -> bool {
        match self.try_send(content, kind, to).await {
            Ok(envelope) => {
                debug!("Sent {} envelope {} to {}", kind, envelope.id(), to);
                true
            }
            Err(e) => {
                warn!("Failed to send {} to {}: {}", kind, to, e);
                false
            }
        }
    }

    /// Send `content` as `kind` to `to` and return the envelope written
    ///
    /// Fails with [`ClientError::NotConnected`] before touching the codec,
    /// the store or the transport when there is no session.
    pub async fn try_send(
        &self,
        content: Content,
        kind: MessageKind,
        to: &str,
    ) -> Result<Envelope, ClientError> {
        let sink = self
            .inner
            .connection
            .lock()
            .await
            .sink()
            .ok_or(ClientError::NotConnected)?;

        let envelope = if kind.is_transfer() {
            let path = match content {
                Content::Path(path) => path,
                Content::Text(text) => text.into(),
                other => {
                    return Err(CodecError::UnsupportedContent {
                        kind,
                        content: other.type_name(),
                    }
                    .into())
                }
            };
            let report = self
                .inner
                .offload
                .upload(&self.inner.client_id, kind, &path)
                .await?;
            Envelope::new(&self.inner.client_id, to, kind, path.display().to_string())
                .with_store_key(report.store_key)
        } else {
            let payload = encode(&content, kind)?;
            Envelope::new(&self.inner.client_id, to, kind, payload)
        };

        send_envelope(&sink, &envelope).await?;
        Ok(envelope)
    }

    pub async fn send_text(&self, text: impl Into<String>, to: &str) -> bool {
        self.send(Content::Text(text.into()), MessageKind::Text, to)
            .await
    }

    /// Serialize `value` and send it as a json envelope
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T, to: &str) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.send(Content::Json(value), MessageKind::Json, to).await,
            Err(e) => {
                warn!("Failed to serialize json payload: {}", e);
                false
            }
        }
    }

    /// Send already-encoded JSON text; invalid JSON is rejected before sending
    pub async fn send_json_str(&self, json: impl Into<String>, to: &str) -> bool {
        self.send(Content::JsonText(json.into()), MessageKind::Json, to)
            .await
    }

    pub async fn send_dict(&self, map: Map<String, Value>, to: &str) -> bool {
        self.send(Content::Dict(map), MessageKind::Dict, to).await
    }

    pub async fn send_bytes(&self, bytes: impl Into<Vec<u8>>, to: &str) -> bool {
        self.send(Content::Bytes(bytes.into()), MessageKind::Bytes, to)
            .await
    }

    /// Upload a regular file to the store and send its key
    pub async fn send_file(&self, path: impl AsRef<Path>, to: &str) -> bool {
        self.send(
            Content::Path(path.as_ref().to_path_buf()),
            MessageKind::File,
            to,
        )
        .await
    }

    /// Upload an image file to the store and send its key
    pub async fn send_image(&self, path: impl AsRef<Path>, to: &str) -> bool {
        self.send(
            Content::Path(path.as_ref().to_path_buf()),
            MessageKind::Image,
            to,
        )
        .await
    }

    /// Upload a directory tree to the store and send its key prefix
    pub async fn send_folder(&self, path: impl AsRef<Path>, to: &str) -> bool {
        self.send(
            Content::Path(path.as_ref().to_path_buf()),
            MessageKind::Folder,
            to,
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Peer Queries
    // ------------------------------------------------------------------------

    /// Ask the relay for connected peers; `None` on failure or timeout
    pub async fn list_peers(&self, only_online: bool, timeout: Duration) -> Option<PeerList> {
        match self.try_list_peers(only_online, timeout).await {
            Ok(list) => {
                info!("Received peer list with {} clients", list.total_count());
                Some(list)
            }
            Err(e) => {
                warn!("Peer list request failed: {}", e);
                None
            }
        }
    }

    pub async fn try_list_peers(
        &self,
        only_online: bool,
        timeout: Duration,
    ) -> Result<PeerList, ClientError> {
        let sink = self
            .inner
            .connection
            .lock()
            .await
            .sink()
            .ok_or(ClientError::NotConnected)?;

        let request = Envelope::new(
            &self.inner.client_id,
            SERVER_ID,
            MessageKind::ListPeers,
            String::new(),
        );
        let mut filter = Map::new();
        filter.insert("only_show_online".to_string(), Value::Bool(only_online));
        filter.insert(
            REQUEST_ID_FIELD.to_string(),
            Value::String(request.id().to_string()),
        );
        let request = request.with_payload(Value::Object(filter).to_string());

        let response = self.inner.pending.register(request.id()).await;
        if let Err(e) = send_envelope(&sink, &request).await {
            self.inner.pending.cancel(request.id()).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(list)) => Ok(list),
            Ok(Err(_)) => Err(ClientError::ResponseDropped),
            Err(_) => {
                self.inner.pending.cancel(request.id()).await;
                Err(ClientError::ResponseTimeout {
                    duration_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------------

    /// Register an async handler for envelopes matching `filter`
    pub async fn add_listener<F, Fut>(&self, filter: ListenerFilter, f: F)
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_handler(filter, handler(f)).await;
    }

    /// Register a pre-boxed handler
    pub async fn add_handler(&self, filter: ListenerFilter, handler: Handler) {
        self.inner.listeners.add(filter, handler).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryConnection, MemoryConnector};
    use crosscomm_core::MemoryStore;
    use futures::channel::mpsc::UnboundedReceiver;
    use futures::StreamExt;

    async fn connected_client(
        client_id: &str,
    ) -> (CrossCommClient, MemoryConnector, MemoryConnection, UnboundedReceiver<MemoryConnection>) {
        let (connector, mut accepted) = MemoryConnector::pair();
        let client = CrossCommClient::builder(ClientConfig::default().with_client_id(client_id))
            .with_connector(Arc::new(connector.clone()))
            .build()
            .unwrap();
        assert!(client.connect().await);
        let connection = accepted.next().await.unwrap();
        (client, connector, connection, accepted)
    }

    #[tokio::test]
    async fn test_connect_sends_login_to_server() {
        let (client, _, mut connection, _accepted) = connected_client("alice").await;

        let login = connection.next_envelope().await.unwrap();
        assert_eq!(login.kind(), MessageKind::Login);
        assert_eq!(login.to_client_id(), SERVER_ID);
        assert_eq!(login.from_client_id(), "alice");
        assert_eq!(login.payload(), "{}");
        assert_eq!(connection.url, "ws://localhost:9898");
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_skips_transport() {
        let (connector, _accepted) = MemoryConnector::pair();
        let client = CrossCommClient::builder(ClientConfig::default().with_client_id("alice"))
            .with_connector(Arc::new(connector.clone()))
            .build()
            .unwrap();

        assert!(!client.send_text("hi", "bob").await);
        assert!(matches!(
            client
                .try_send(Content::from("hi"), MessageKind::Text, "bob")
                .await,
            Err(ClientError::NotConnected)
        ));
        assert!(client
            .list_peers(true, Duration::from_millis(10))
            .await
            .is_none());
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn test_refused_connection_returns_false() {
        let (connector, _accepted) = MemoryConnector::pair();
        connector.set_refuse(true);
        let client = CrossCommClient::builder(ClientConfig::default())
            .with_connector(Arc::new(connector.clone()))
            .build()
            .unwrap();

        assert!(!client.connect().await);
        assert_eq!(client.state().await, ConnectionState::Disconnected);

        // A later attempt may succeed
        connector.set_refuse(false);
        assert!(client.connect().await);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let (client, connector, _connection, _accepted) = connected_client("alice").await;
        assert!(client.connect().await);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_twice_sends_one_logout() {
        let (client, _, mut connection, _accepted) = connected_client("alice").await;

        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);

        let mut logouts = 0;
        while let Some(envelope) = connection.next_envelope().await {
            if envelope.kind() == MessageKind::Logout {
                logouts += 1;
            }
        }
        assert_eq!(logouts, 1);
    }

    #[tokio::test]
    async fn test_file_send_without_store_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ten.bin");
        std::fs::write(&file, [7u8; 10]).unwrap();

        let (client, _, mut connection, _accepted) = connected_client("alice").await;
        assert_eq!(
            connection.next_envelope().await.unwrap().kind(),
            MessageKind::Login
        );

        assert!(!client.send_file(&file, "bob").await);
        let sent: Vec<MessageKind> = connection
            .drain_frames()
            .iter()
            .filter_map(|frame| frame.decode().ok())
            .map(|envelope| envelope.kind())
            .filter(|kind| *kind != MessageKind::Heartbeat)
            .collect();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_file_send_attaches_store_key() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"notes").unwrap();

        let (connector, mut accepted) = MemoryConnector::pair();
        let store = Arc::new(MemoryStore::new());
        let client = CrossCommClient::builder(ClientConfig::default().with_client_id("alice"))
            .with_connector(Arc::new(connector))
            .with_store(store.clone())
            .build()
            .unwrap();
        assert!(client.connect().await);
        let mut connection = accepted.next().await.unwrap();
        connection.next_envelope().await.unwrap();

        assert!(client.send_file(&file, "bob").await);
        let envelope = connection.next_envelope().await.unwrap();
        assert_eq!(envelope.kind(), MessageKind::File);
        assert_eq!(envelope.payload(), file.display().to_string());
        let key = envelope.store_key().unwrap();
        assert!(key.starts_with("cross_comm/alice/") && key.ends_with(".txt"));
        assert_eq!(store.keys(), vec![key.to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_json_is_not_sent() {
        let (client, _, mut connection, _accepted) = connected_client("alice").await;
        connection.next_envelope().await.unwrap();

        assert!(!client.send_json_str("{broken", "bob").await);
        assert!(client.send_json_str(r#"{"ok":true}"#, "bob").await);
        let envelope = connection.next_envelope().await.unwrap();
        assert_eq!(envelope.kind(), MessageKind::Json);
        assert_eq!(envelope.payload(), r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_list_peers_zero_timeout_returns_none() {
        let (client, _, _connection, _accepted) = connected_client("alice").await;
        let started = std::time::Instant::now();
        assert!(client.list_peers(true, Duration::ZERO).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(client.inner.pending.len().await, 0);
    }

    #[tokio::test]
    async fn test_list_peers_completes_from_response() {
        let (client, _, mut connection, _accepted) = connected_client("alice").await;
        connection.next_envelope().await.unwrap();

        let querying = client.clone();
        let query =
            tokio::spawn(async move { querying.list_peers(false, Duration::from_secs(5)).await });

        let request = connection.next_envelope().await.unwrap();
        assert_eq!(request.kind(), MessageKind::ListPeers);
        let filter: Value = serde_json::from_str(request.payload()).unwrap();
        assert_eq!(filter["only_show_online"], Value::Bool(false));
        assert_eq!(filter["request_id"], Value::String(request.id().to_string()));

        let payload = serde_json::json!({
            "clients": [{"client_id": "alice"}, {"client_id": "bob"}],
            "total_count": 2,
            "request_id": request.id(),
        });
        connection.inject(&Envelope::new(
            &ClientId::new(SERVER_ID),
            "alice",
            MessageKind::ListPeersResponse,
            payload.to_string(),
        ));

        let list = query.await.unwrap().unwrap();
        assert_eq!(list.total_count(), 2);
        assert_eq!(list.clients()[1].client_id, "bob");
    }

    #[tokio::test]
    async fn test_own_envelopes_and_heartbeats_are_not_dispatched() {
        let (client, _, connection, _accepted) = connected_client("alice").await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client
            .add_listener(ListenerFilter::any(), move |envelope| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(envelope);
                }
            })
            .await;

        let alice = ClientId::new("alice");
        let bob = ClientId::new("bob");
        connection.inject(&Envelope::new(&alice, "all", MessageKind::Text, "echo"));
        connection.inject(&Envelope::new(&bob, "alice", MessageKind::Heartbeat, "{}"));
        connection.inject(&Envelope::new(&bob, "alice", MessageKind::Text, "real"));
        connection.inject_frame(crate::transport::Frame::Text("not json".into()));
        connection.inject(&Envelope::new(&bob, "alice", MessageKind::Text, "after"));

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.payload(), "real");
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.payload(), "after");
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn test_receive_failure_marks_disconnected() {
        let (client, _, connection, _accepted) = connected_client("alice").await;
        connection.fail("socket reset");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while client.is_connected().await {
            assert!(tokio::time::Instant::now() < deadline, "still connected");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!client.send_text("hi", "bob").await);
    }
}
