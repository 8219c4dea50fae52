//! Message delimiting for byte-stream connections.
//!
//! Tagged frames carry no length of their own; a message-oriented connection
//! delivers them whole. Byte streams (TCP, Unix sockets) wrap each frame in
//! a small header so the far side can recover the boundaries.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{FrameError, Result};

/// Message header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "TW" (0x54 0x57).
pub const MAGIC: [u8; 2] = [0x54, 0x57];

/// Default maximum message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Default number of inbound messages a connection reads ahead of its owner.
pub const DEFAULT_INBOUND_CAPACITY: usize = 32;

/// Wrap one frame in a message header.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Frame            │
/// │ 0x54 0x57    │ (4B LE)   │ (Length bytes)   │
/// │ "TW"         │           │                  │
/// └──────────────┴───────────┴─────────────────┘
/// ```
pub fn write_message(frame: &[u8], dst: &mut BytesMut) -> Result<()> {
    if frame.len() > u32::MAX as usize {
        return Err(FrameError::MessageTooLarge {
            size: frame.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + frame.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(frame.len() as u32);
    dst.put_slice(frame);
    Ok(())
}

/// Split one complete message off the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete message yet.
/// On success, consumes the message bytes and returns the enclosed frame.
pub fn read_message(src: &mut BytesMut, max_message: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        debug!(magic = ?&src[0..2], "rejecting message with bad magic");
        return Err(FrameError::InvalidMagic);
    }

    let len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if len > max_message {
        debug!(size = len, max = max_message, "rejecting oversized message");
        return Err(FrameError::MessageTooLarge {
            size: len,
            max: max_message,
        });
    }

    if src.len() < HEADER_SIZE + len {
        src.reserve(HEADER_SIZE + len - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}

/// Configuration for message readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum delimited message size in bytes. Default: 16 MiB.
    pub max_message_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
    /// Inbound messages a connection may queue before it stops reading from
    /// the socket. Default: 32. Zero is treated as one.
    pub inbound_capacity: usize,
}

impl FrameConfig {
    /// Queue bound for inbound events, never zero.
    pub fn inbound_bound(&self) -> usize {
        self.inbound_capacity.max(1)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
            read_timeout: None,
            write_timeout: None,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}
