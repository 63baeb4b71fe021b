//! Length-prefixed frame format.
//!
//! Frame layout (4 bytes header + payload):
//!
//! ```text
//! +-------------+---------------------+
//! | payload_len | payload             |
//! | 4 bytes, BE | payload_len bytes   |
//! +-------------+---------------------+
//! ```
//!
//! The length counts payload bytes only. A zero length is a valid, empty
//! frame.

use crate::error::ProtocolError;
use crate::DEFAULT_MAX_FRAME_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Stateless frame encoder/decoder bounded by a maximum payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_size: u32,
}

impl FrameCodec {
    pub fn new(max_frame_size: u32) -> Self {
        Self { max_frame_size }
    }

    /// Returns the largest payload this codec accepts.
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Wraps a payload with its length header.
    pub fn encode(&self, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
        let size = self.check_len(payload.len())?;

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
        buf.put_u32(size);
        buf.put_slice(payload);
        Ok(buf)
    }

    /// Decodes a single frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(payload))` if a complete frame was consumed,
    /// `Ok(None)` if more data is needed (nothing is consumed), or `Err` if
    /// the declared length exceeds the maximum frame size.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming
        let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if declared > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: declared as u64,
                max: self.max_frame_size,
            });
        }

        let payload_len = declared as usize;
        if buf.len() - FRAME_HEADER_SIZE < payload_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        Ok(Some(buf.split_to(payload_len).freeze()))
    }

    /// Appends `data` to `buf` and drains every complete frame.
    ///
    /// Incomplete trailing bytes (header included) stay in `buf`, so the next
    /// call resumes exactly where this one stopped.
    ///
    /// An oversized header is reported only once the frames ahead of it have
    /// been returned: it stays at the front of `buf` and the next call fails.
    pub fn feed(&self, buf: &mut BytesMut, data: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
        buf.extend_from_slice(data);

        let mut payloads = Vec::new();
        loop {
            match self.decode(buf) {
                Ok(Some(payload)) => payloads.push(payload),
                Ok(None) => break,
                Err(e) if payloads.is_empty() => return Err(e),
                Err(_) => break,
            }
        }
        Ok(payloads)
    }

    fn check_len(&self, len: usize) -> Result<u32, ProtocolError> {
        if len > self.max_frame_size as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: len as u64,
                max: self.max_frame_size,
            });
        }
        Ok(len as u32)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

/// A [`FrameCodec`] paired with its receive-side accumulator.
///
/// Owned by the single task reading a connection; it is not shared.
#[derive(Debug)]
pub struct FrameDecoder {
    codec: FrameCodec,
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Feeds newly read bytes and returns the payloads they complete.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
        self.codec.feed(&mut self.buffer, data)
    }

    /// Buffers newly read bytes without decoding them.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Takes the next complete frame, if one is buffered.
    ///
    /// An oversized header is not consumed, so every later call fails too.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        self.codec.decode(&mut self.buffer)
    }

    /// Returns the number of bytes held back waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discards any partially received frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(FrameCodec::default())
    }
}
