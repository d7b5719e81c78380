//! Frame codec for NUL-terminated JSON messages.
//!
//! # Frame Format
//!
//! Each frame consists of:
//! - N bytes: UTF-8 encoded JSON document
//! - 1 byte: terminator `0x00`
//!
//! There is no length prefix. Readers accumulate bytes until the terminator
//! shows up, which means a peer that never sends one can only be stopped by
//! a size limit or a timeout. [`FrameDecoder`] enforces the size limit.

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, Result};

/// Byte that terminates every frame.
pub const FRAME_TERMINATOR: u8 = 0;

/// Maximum payload size accepted before a terminator is seen (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Serialize a message as JSON and append the terminator.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut output = serde_json::to_vec(message)?;
    if output.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: output.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    output.push(FRAME_TERMINATOR);
    Ok(output)
}

/// Parse a frame payload (terminator already stripped) as JSON.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| ProtocolError::Deserialization(format!("invalid UTF-8: {}", e)))?;
    Ok(serde_json::from_str(text)?)
}

/// Streaming decoder that accumulates reads until a terminator is found.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default [`MAX_FRAME_SIZE`] limit.
    pub fn new() -> Self {
        Self::with_max_size(MAX_FRAME_SIZE)
    }

    /// Create a decoder with a custom payload limit.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(2048),
            max_size,
        }
    }

    /// Append freshly read bytes.
    ///
    /// Fails once more than `max_size` bytes are buffered without any
    /// terminator among them.
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > self.max_size && !self.has_frame() {
            return Err(ProtocolError::FrameTooLarge {
                size: self.buffer.len(),
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Whether a complete frame is buffered.
    pub fn has_frame(&self) -> bool {
        self.buffer.contains(&FRAME_TERMINATOR)
    }

    /// Take the next complete frame, without its terminator.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let pos = self.buffer.iter().position(|b| *b == FRAME_TERMINATOR)?;
        let mut frame = self.buffer.split_to(pos + 1);
        frame.truncate(pos);
        Some(frame.freeze())
    }

    /// Number of bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
