//! Framed message encoding and decoding.
//!
//! Binds a [`FrameCodec`] to a [`PayloadSerializer`] so connections deal in
//! envelopes rather than raw payloads.

use crate::error::ProtocolError;
use crate::frame::{FrameCodec, FrameDecoder};
use crate::message::{Message, MessageKind};
use crate::serializer::PayloadSerializer;
use bytes::BytesMut;
use std::sync::Arc;

/// Encodes envelopes into frames.
#[derive(Clone)]
pub struct MessageCodec {
    frames: FrameCodec,
    serializer: Arc<dyn PayloadSerializer>,
}

impl MessageCodec {
    pub fn new(frames: FrameCodec, serializer: Arc<dyn PayloadSerializer>) -> Self {
        Self { frames, serializer }
    }

    /// Serializes and frames a message.
    pub fn encode(&self, message: &Message) -> Result<BytesMut, ProtocolError> {
        let payload = self.serializer.serialize(message)?;
        self.frames.encode(&payload)
    }

    /// Creates a decoder sharing this codec's limits and serializer.
    pub fn decoder(&self, expect: MessageKind) -> MessageDecoder {
        MessageDecoder {
            frames: FrameDecoder::new(self.frames),
            serializer: self.serializer.clone(),
            expect,
            failed: None,
        }
    }

    pub fn serializer_name(&self) -> &'static str {
        self.serializer.name()
    }

    pub fn frame_codec(&self) -> FrameCodec {
        self.frames
    }
}

impl std::fmt::Debug for MessageCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCodec")
            .field("max_frame_size", &self.frames.max_frame_size())
            .field("serializer", &self.serializer.name())
            .finish()
    }
}

/// Receive side of a connection: accumulates bytes and yields envelopes of
/// the expected kind, in arrival order.
pub struct MessageDecoder {
    frames: FrameDecoder,
    serializer: Arc<dyn PayloadSerializer>,
    expect: MessageKind,
    /// Error held back by `feed` until the messages ahead of it are handed out.
    failed: Option<ProtocolError>,
}

impl MessageDecoder {
    /// Buffers newly read bytes; drain them with [`next_message`](Self::next_message).
    pub fn push(&mut self, data: &[u8]) {
        self.frames.push(data);
    }

    /// Decodes the next buffered message.
    ///
    /// Returns `Ok(None)` when no complete frame is buffered. Any error is
    /// fatal for the connection, but every message before the bad frame has
    /// already been returned by earlier calls.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        if let Some(e) = self.failed.take() {
            return Err(e);
        }
        let Some(payload) = self.frames.next_frame()? else {
            return Ok(None);
        };

        let message = self.serializer.deserialize(&payload, self.expect)?;
        if message.kind() != self.expect {
            return Err(ProtocolError::UnexpectedMessage {
                expected: self.expect,
                actual: message.kind(),
            });
        }
        Ok(Some(message))
    }

    /// Feeds newly read bytes and decodes every completed frame.
    ///
    /// When a bad frame follows good ones, the good messages are returned and
    /// the error comes back from the next call.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Message>, ProtocolError> {
        self.push(data);

        let mut messages = Vec::new();
        loop {
            match self.next_message() {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => return Ok(messages),
                Err(e) if messages.is_empty() => return Err(e),
                Err(e) => {
                    self.failed = Some(e);
                    return Ok(messages);
                }
            }
        }
    }

    /// Returns the number of bytes buffered toward the next frame.
    pub fn buffered(&self) -> usize {
        self.frames.buffered()
    }

    pub fn expects(&self) -> MessageKind {
        self.expect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Request, Response};
    use crate::serializer::{JsonSerializer, SerializerKind};
    use serde_json::json;

    fn json_codec() -> MessageCodec {
        MessageCodec::new(FrameCodec::default(), Arc::new(JsonSerializer))
    }

    #[test]
    fn test_request_roundtrip() {
        let codec = json_codec();
        let request = Request::new(7, "hello").with_argument(json!("hi"));
        let encoded = codec.encode(&request.clone().into()).unwrap();

        let mut decoder = codec.decoder(MessageKind::Request);
        let decoded = decoder.feed(&encoded).unwrap();
        assert_eq!(decoded, vec![Message::Request(request)]);
    }

    #[test]
    fn test_payload_is_plain_json() {
        let codec = json_codec();
        let encoded = codec
            .encode(&Response::ok(7, json!("echo:hi")).into())
            .unwrap();
        let body = std::str::from_utf8(&encoded[4..]).unwrap();
        assert_eq!(body, r#"{"call_id":7,"error":null,"result":"echo:hi"}"#);
    }

    #[test]
    fn test_partial_then_sticky() {
        let codec = MessageCodec::new(FrameCodec::default(), SerializerKind::MsgPack.build());
        let mut wire = Vec::new();
        for id in 1..=3 {
            wire.extend_from_slice(&codec.encode(&Response::ok(id, json!(id)).into()).unwrap());
        }

        let mut decoder = codec.decoder(MessageKind::Response);
        let first = decoder.feed(&wire[..3]).unwrap();
        assert!(first.is_empty());
        assert_eq!(decoder.buffered(), 3);

        let rest = decoder.feed(&wire[3..]).unwrap();
        let ids: Vec<u64> = rest.iter().map(Message::call_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_corrupt_payload_is_fatal() {
        let codec = json_codec();
        let frame = FrameCodec::default().encode(b"\xFF\xFE garbage").unwrap();

        let mut decoder = codec.decoder(MessageKind::Response);
        let err = decoder.feed(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization { .. }));
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn test_messages_ahead_of_corrupt_frame_are_delivered() {
        let codec = json_codec();
        let mut wire = Vec::new();
        wire.extend_from_slice(&codec.encode(&Response::ok(1, json!("one")).into()).unwrap());
        wire.extend_from_slice(&codec.encode(&Response::ok(2, json!("two")).into()).unwrap());
        wire.extend_from_slice(&FrameCodec::default().encode(b"{oops").unwrap());

        let mut decoder = codec.decoder(MessageKind::Response);
        decoder.push(&wire);
        assert_eq!(decoder.next_message().unwrap().unwrap().call_id(), 1);
        assert_eq!(decoder.next_message().unwrap().unwrap().call_id(), 2);
        let err = decoder.next_message().unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization { .. }));

        // Same stream through feed: good messages first, then the error
        let mut decoder = codec.decoder(MessageKind::Response);
        let messages = decoder.feed(&wire).unwrap();
        let ids: Vec<u64> = messages.iter().map(Message::call_id).collect();
        assert_eq!(ids, vec![1, 2]);
        let err = decoder.feed(&[]).unwrap_err();
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn test_oversized_frame_rejected_before_body() {
        let codec = MessageCodec::new(FrameCodec::new(16), Arc::new(JsonSerializer));
        let mut decoder = codec.decoder(MessageKind::Request);
        // Header alone announces 1 MiB
        let err = decoder.feed(&(1024u32 * 1024).to_be_bytes()).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_codec_debug() {
        let debug = format!("{:?}", json_codec());
        assert!(debug.contains("json"));
        assert_eq!(json_codec().decoder(MessageKind::Request).expects(), MessageKind::Request);
    }
}
