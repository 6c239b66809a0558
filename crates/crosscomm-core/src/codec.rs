//! Content codec
//!
//! Maps typed [`Content`] onto the envelope's string payload for the inline
//! kinds (text, json, dict, bytes) and back. File, image and folder kinds
//! carry a local path instead of inline data and are handled by
//! [`crate::offload`]; the codec refuses to encode them.

use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Value};

use crate::envelope::MessageKind;
use crate::errors::CodecError;

// ----------------------------------------------------------------------------
// Content
// ----------------------------------------------------------------------------

/// Payload handed to a send call, chosen by the convenience method used
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Plain text
    Text(String),
    /// Already-encoded JSON text; validated before sending
    JsonText(String),
    /// Structured JSON value
    Json(Value),
    /// String-keyed map
    Dict(Map<String, Value>),
    /// Raw bytes, sent as base64
    Bytes(Vec<u8>),
    /// Local filesystem path for file, image and folder kinds
    Path(PathBuf),
}

impl Content {
    /// Short name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Content::Text(_) => "text",
            Content::JsonText(_) => "json text",
            Content::Json(_) => "json value",
            Content::Dict(_) => "dict",
            Content::Bytes(_) => "bytes",
            Content::Path(_) => "path",
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Json(value)
    }
}

impl From<Map<String, Value>> for Content {
    fn from(map: Map<String, Value>) -> Self {
        Content::Dict(map)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Bytes(bytes)
    }
}

impl From<PathBuf> for Content {
    fn from(path: PathBuf) -> Self {
        Content::Path(path)
    }
}

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Encode content into the payload string for `kind`
pub fn encode(content: &Content, kind: MessageKind) -> Result<String, CodecError> {
    match kind {
        MessageKind::File | MessageKind::Image | MessageKind::Folder => {
            Err(CodecError::TransferKind { kind })
        }
        MessageKind::Json => encode_json(content, kind),
        MessageKind::Dict => match content {
            Content::Dict(map) => Ok(serde_json::to_string(map)?),
            Content::Json(value @ Value::Object(_)) => Ok(serde_json::to_string(value)?),
            other => Err(unsupported(kind, other)),
        },
        MessageKind::Bytes => match content {
            Content::Bytes(bytes) => Ok(general_purpose::STANDARD.encode(bytes)),
            other => Err(unsupported(kind, other)),
        },
        // Text and control kinds are stringified as-is
        _ => match content {
            Content::Text(text) | Content::JsonText(text) => Ok(text.clone()),
            Content::Json(value) => Ok(value.to_string()),
            Content::Dict(map) => Ok(serde_json::to_string(map)?),
            Content::Path(path) => Ok(path.display().to_string()),
            other @ Content::Bytes(_) => Err(unsupported(kind, other)),
        },
    }
}

fn encode_json(content: &Content, kind: MessageKind) -> Result<String, CodecError> {
    match content {
        // Strings must already be valid JSON documents
        Content::Text(text) | Content::JsonText(text) => {
            serde_json::from_str::<Value>(text)?;
            Ok(text.clone())
        }
        Content::Json(value) => Ok(serde_json::to_string(value)?),
        Content::Dict(map) => Ok(serde_json::to_string(map)?),
        other => Err(unsupported(kind, other)),
    }
}

fn unsupported(kind: MessageKind, content: &Content) -> CodecError {
    CodecError::UnsupportedContent {
        kind,
        content: content.type_name(),
    }
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Decode a payload string of `kind` back into typed content
pub fn decode(kind: MessageKind, payload: &str) -> Result<Content, CodecError> {
    match kind {
        MessageKind::Text => Ok(Content::Text(payload.to_string())),
        MessageKind::Json | MessageKind::ListPeers | MessageKind::ListPeersResponse => {
            Ok(Content::Json(serde_json::from_str(payload)?))
        }
        MessageKind::Dict => match serde_json::from_str::<Value>(payload)? {
            Value::Object(map) => Ok(Content::Dict(map)),
            _ => Err(CodecError::NotAnObject { kind }),
        },
        MessageKind::Bytes => Ok(Content::Bytes(general_purpose::STANDARD.decode(payload)?)),
        MessageKind::File | MessageKind::Image | MessageKind::Folder => {
            Ok(Content::Path(PathBuf::from(payload)))
        }
        MessageKind::Heartbeat
        | MessageKind::Login
        | MessageKind::Logout
        | MessageKind::LoginResponse => Ok(serde_json::from_str(payload)
            .map(Content::Json)
            .unwrap_or_else(|_| Content::Text(payload.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_encoding() {
        let payload = encode(&Content::from("hi"), MessageKind::Text).unwrap();
        assert_eq!(payload, "hi");
        assert_eq!(
            decode(MessageKind::Text, &payload).unwrap(),
            Content::from("hi")
        );
    }

    #[test]
    fn test_json_string_is_validated() {
        let ok = encode(&Content::JsonText(r#"{"a":1}"#.into()), MessageKind::Json).unwrap();
        assert_eq!(ok, r#"{"a":1}"#);

        let err = encode(&Content::JsonText("{not json".into()), MessageKind::Json);
        assert!(matches!(err, Err(CodecError::InvalidJson(_))));
    }

    #[test]
    fn test_json_value_is_serialized() {
        let value = json!({"name": "sensor", "values": [1, 2, 3]});
        let payload = encode(&Content::Json(value.clone()), MessageKind::Json).unwrap();
        assert_eq!(
            decode(MessageKind::Json, &payload).unwrap(),
            Content::Json(value)
        );
    }

    #[test]
    fn test_dict_requires_object() {
        let mut map = Map::new();
        map.insert("k".into(), json!("v"));
        let payload = encode(&Content::Dict(map.clone()), MessageKind::Dict).unwrap();
        assert_eq!(payload, r#"{"k":"v"}"#);
        assert_eq!(
            decode(MessageKind::Dict, &payload).unwrap(),
            Content::Dict(map)
        );

        assert!(encode(&Content::from("plain"), MessageKind::Dict).is_err());
        assert!(matches!(
            decode(MessageKind::Dict, "[1,2]"),
            Err(CodecError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_bytes_use_base64() {
        let payload = encode(&Content::Bytes(vec![0, 1, 2, 255]), MessageKind::Bytes).unwrap();
        assert_eq!(payload, "AAEC/w==");
        assert_eq!(
            decode(MessageKind::Bytes, &payload).unwrap(),
            Content::Bytes(vec![0, 1, 2, 255])
        );
        assert!(matches!(
            decode(MessageKind::Bytes, "***"),
            Err(CodecError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_base64_error_is_reported_as_source() {
        use std::error::Error as _;

        let err = decode(MessageKind::Bytes, "not base64!").unwrap_err();
        let source = err.source().expect("decode error keeps its cause");
        assert!(!source.to_string().is_empty());
    }

    #[test]
    fn test_transfer_kinds_bypass_codec() {
        for kind in [MessageKind::File, MessageKind::Image, MessageKind::Folder] {
            let err = encode(&Content::Path("/tmp/x".into()), kind);
            assert!(matches!(err, Err(CodecError::TransferKind { .. })));
            assert_eq!(
                decode(kind, "/tmp/x").unwrap(),
                Content::Path(PathBuf::from("/tmp/x"))
            );
        }
    }

    #[test]
    fn test_bytes_cannot_be_sent_as_text() {
        assert!(matches!(
            encode(&Content::Bytes(vec![1]), MessageKind::Text),
            Err(CodecError::UnsupportedContent { .. })
        ));
    }
}
