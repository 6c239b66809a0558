//! Envelope model
//!
//! One [`Envelope`] is one discrete message on the relay connection. On the
//! wire it is a UTF-8 JSON document:
//!
//! ```json
//! {"msg_id": "...", "from_client_id": "...", "to_client_id": "...",
//!  "msg_type": "text", "content": "...", "timestamp": 1700000000.5,
//!  "oss_key": "cross_comm/..."}
//! ```
//!
//! `oss_key` is only present for file, image and folder envelopes whose payload
//! lives in the object store.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EnvelopeError;
use crate::types::{generate_message_id, unix_time_secs, ClientId};

// ----------------------------------------------------------------------------
// Message Kind
// ----------------------------------------------------------------------------

/// Closed set of envelope purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "dict")]
    Dict,
    #[serde(rename = "bytes")]
    Bytes,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "folder")]
    Folder,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "login")]
    Login,
    #[serde(rename = "logout")]
    Logout,
    #[serde(rename = "list_clients")]
    ListPeers,
    #[serde(rename = "list_clients_response")]
    ListPeersResponse,
    #[serde(rename = "login_response")]
    LoginResponse,
}

impl MessageKind {
    /// Every kind, in declaration order
    pub const ALL: [MessageKind; 13] = [
        MessageKind::Text,
        MessageKind::Json,
        MessageKind::Dict,
        MessageKind::Bytes,
        MessageKind::File,
        MessageKind::Image,
        MessageKind::Folder,
        MessageKind::Heartbeat,
        MessageKind::Login,
        MessageKind::Logout,
        MessageKind::ListPeers,
        MessageKind::ListPeersResponse,
        MessageKind::LoginResponse,
    ];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Json => "json",
            MessageKind::Dict => "dict",
            MessageKind::Bytes => "bytes",
            MessageKind::File => "file",
            MessageKind::Image => "image",
            MessageKind::Folder => "folder",
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::Login => "login",
            MessageKind::Logout => "logout",
            MessageKind::ListPeers => "list_clients",
            MessageKind::ListPeersResponse => "list_clients_response",
            MessageKind::LoginResponse => "login_response",
        }
    }

    /// Kinds whose payload is a local path backed by an object-store key
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            MessageKind::File | MessageKind::Image | MessageKind::Folder
        )
    }

    /// Kinds that are never handed to user listeners
    pub fn is_suppressed(&self) -> bool {
        matches!(self, MessageKind::Heartbeat | MessageKind::ListPeersResponse)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EnvelopeError::UnknownKind {
                kind: s.to_string(),
            })
    }
}

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// Immutable message unit exchanged through the relay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "msg_id")]
    id: String,
    from_client_id: String,
    to_client_id: String,
    #[serde(rename = "msg_type")]
    kind: MessageKind,
    #[serde(rename = "content")]
    payload: String,
    timestamp: f64,
    #[serde(rename = "oss_key", skip_serializing_if = "Option::is_none")]
    store_key: Option<String>,
}

impl Envelope {
    /// Create a new envelope stamped with a fresh id and the current time
    pub fn new(
        from: &ClientId,
        to: impl Into<String>,
        kind: MessageKind,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_message_id(from),
            from_client_id: from.to_string(),
            to_client_id: to.into(),
            kind,
            payload: payload.into(),
            timestamp: unix_time_secs(),
            store_key: None,
        }
    }

    /// Create an envelope from explicit parts (used by decoders and tests)
    pub fn from_parts(
        id: impl Into<String>,
        from_client_id: impl Into<String>,
        to_client_id: impl Into<String>,
        kind: MessageKind,
        payload: impl Into<String>,
        timestamp: f64,
        store_key: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from_client_id: from_client_id.into(),
            to_client_id: to_client_id.into(),
            kind,
            payload: payload.into(),
            timestamp,
            store_key: store_key.filter(|_| kind.is_transfer()),
        }
    }

    /// Attach the object-store key of a relocated payload
    ///
    /// Ignored for kinds that carry their payload inline.
    pub fn with_store_key(mut self, key: impl Into<String>) -> Self {
        if self.kind.is_transfer() {
            self.store_key = Some(key.into());
        }
        self
    }

    /// Same envelope with its payload replaced; id, routing and key are kept
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from_client_id(&self) -> &str {
        &self.from_client_id
    }

    pub fn to_client_id(&self) -> &str {
        &self.to_client_id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn store_key(&self) -> Option<&str> {
        self.store_key.as_deref()
    }

    /// Decode the payload into typed content according to the kind
    pub fn decode_content(&self) -> Result<crate::codec::Content, crate::errors::CodecError> {
        crate::codec::decode(self.kind, &self.payload)
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope = serde_json::from_str(text)?;
        wire.into_envelope()
    }

    /// Decode a binary frame holding UTF-8 JSON
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let text = core::str::from_utf8(bytes).map_err(|_| EnvelopeError::InvalidUtf8)?;
        Self::from_json(text)
    }
}

// ----------------------------------------------------------------------------
// Wire Decoding
// ----------------------------------------------------------------------------

/// Lenient inbound shape: `content` may be any JSON value or absent
#[derive(Deserialize)]
struct WireEnvelope {
    msg_id: String,
    from_client_id: String,
    to_client_id: String,
    msg_type: String,
    #[serde(default)]
    content: Option<serde_json::Value>,
    timestamp: f64,
    #[serde(default)]
    oss_key: Option<String>,
}

impl WireEnvelope {
    fn into_envelope(self) -> Result<Envelope, EnvelopeError> {
        let kind: MessageKind = self.msg_type.parse()?;
        let payload = match self.content {
            Some(serde_json::Value::String(text)) => text,
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Ok(Envelope::from_parts(
            self.msg_id,
            self.from_client_id,
            self.to_client_id,
            kind,
            payload,
            self.timestamp,
            self.oss_key,
        ))
    }
}
