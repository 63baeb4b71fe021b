//! Pluggable payload serialization.
//!
//! The framing layer treats payloads as opaque bytes. A [`PayloadSerializer`]
//! turns envelopes into those bytes and back, using a [`MessageKind`] as the
//! type hint for decoding.

use crate::error::ProtocolError;
use crate::message::{Message, MessageKind, Request, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Converts envelopes to and from payload bytes.
pub trait PayloadSerializer: Send + Sync + 'static {
    /// Short name used in configuration and logs.
    fn name(&self) -> &'static str;

    fn serialize(&self, message: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Decodes `bytes` as the envelope named by `kind`.
    ///
    /// Malformed input yields [`ProtocolError::Deserialization`].
    fn deserialize(&self, bytes: &[u8], kind: MessageKind) -> Result<Message, ProtocolError>;
}

/// JSON payloads via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl PayloadSerializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let result = match message {
            Message::Request(request) => serde_json::to_vec(request),
            Message::Response(response) => serde_json::to_vec(response),
        };
        result.map_err(|e| ProtocolError::Serialization {
            kind: message.kind(),
            reason: e.to_string(),
        })
    }

    fn deserialize(&self, bytes: &[u8], kind: MessageKind) -> Result<Message, ProtocolError> {
        let result = match kind {
            MessageKind::Request => serde_json::from_slice::<Request>(bytes).map(Message::from),
            MessageKind::Response => serde_json::from_slice::<Response>(bytes).map(Message::from),
        };
        result.map_err(|e| ProtocolError::Deserialization {
            kind,
            reason: e.to_string(),
        })
    }
}

/// MessagePack payloads via `rmp-serde`.
///
/// Structs are written as maps (`to_vec_named`) so field order is not part
/// of the contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

impl PayloadSerializer for MsgPackSerializer {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let result = match message {
            Message::Request(request) => rmp_serde::to_vec_named(request),
            Message::Response(response) => rmp_serde::to_vec_named(response),
        };
        result.map_err(|e| ProtocolError::Serialization {
            kind: message.kind(),
            reason: e.to_string(),
        })
    }

    fn deserialize(&self, bytes: &[u8], kind: MessageKind) -> Result<Message, ProtocolError> {
        let result = match kind {
            MessageKind::Request => rmp_serde::from_slice::<Request>(bytes).map(Message::from),
            MessageKind::Response => rmp_serde::from_slice::<Response>(bytes).map(Message::from),
        };
        result.map_err(|e| ProtocolError::Deserialization {
            kind,
            reason: e.to_string(),
        })
    }
}

/// Serializer selection, as written in configuration files and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    Json,
    MsgPack,
}

impl SerializerKind {
    /// Builds the shared serializer instance.
    pub fn build(self) -> Arc<dyn PayloadSerializer> {
        match self {
            SerializerKind::Json => Arc::new(JsonSerializer),
            SerializerKind::MsgPack => Arc::new(MsgPackSerializer),
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializerKind::Json => write!(f, "json"),
            SerializerKind::MsgPack => write!(f, "msgpack"),
        }
    }
}

impl FromStr for SerializerKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(SerializerKind::Json),
            "msgpack" | "messagepack" => Ok(SerializerKind::MsgPack),
            other => Err(ProtocolError::UnknownSerializer(other.to_string())),
        }
    }
}
