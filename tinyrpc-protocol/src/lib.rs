//! # tinyrpc-protocol
//!
//! Wire protocol implementation for tinyrpc.
//!
//! This crate provides:
//! - Length-prefixed binary framing (`u32` big-endian length + payload)
//! - Restartable stream decoding for half-pack and sticky-pack reads
//! - Request/Response envelope types correlated by call id
//! - Pluggable payload serialization (JSON, MessagePack)
//! - The `#`-marker plain-text convention

pub mod codec;
pub mod error;
pub mod frame;
pub mod marker;
pub mod message;
pub mod method;
pub mod serializer;

pub use codec::{MessageCodec, MessageDecoder};
pub use error::ProtocolError;
pub use frame::{FrameCodec, FrameDecoder, FRAME_HEADER_SIZE};
pub use message::{Message, MessageKind, Request, Response};
pub use method::Method;
pub use serializer::{JsonSerializer, MsgPackSerializer, PayloadSerializer, SerializerKind};

/// Default port for the tinyrpc server.
pub const DEFAULT_PORT: u16 = 7000;

/// Default maximum frame payload size (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;
