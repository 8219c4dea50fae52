use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Type tag for a UTF-8 text payload.
pub const TAG_TEXT: u8 = 0x00;

/// Type tag for a binary payload.
pub const TAG_BINARY: u8 = 0x01;

/// Size of the type tag that prefixes every frame.
pub const TAG_SIZE: usize = 1;

/// Payload kind carried by the frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Binary,
}

impl PayloadKind {
    /// The wire tag byte for this kind.
    pub fn tag(self) -> u8 {
        match self {
            PayloadKind::Text => TAG_TEXT,
            PayloadKind::Binary => TAG_BINARY,
        }
    }

    /// Resolve a wire tag byte.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            TAG_TEXT => Ok(PayloadKind::Text),
            TAG_BINARY => Ok(PayloadKind::Binary),
            other => Err(FrameError::UnknownTag(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PayloadKind::Text => "text",
            PayloadKind::Binary => "binary",
        }
    }
}

/// A packet exchanged with the upper protocol layer.
///
/// Higher-level packet types (open, close, ping, message, ...) travel inside
/// the payload; framing only distinguishes text from binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Text(String),
    Binary(Bytes),
}

impl Packet {
    /// Create a text packet.
    pub fn text(payload: impl Into<String>) -> Self {
        Packet::Text(payload.into())
    }

    /// Create a binary packet.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Packet::Binary(payload.into())
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Packet::Text(_) => PayloadKind::Text,
            Packet::Binary(_) => PayloadKind::Binary,
        }
    }

    /// Raw payload bytes (UTF-8 for text packets).
    pub fn payload(&self) -> &[u8] {
        match self {
            Packet::Text(text) => text.as_bytes(),
            Packet::Binary(bytes) => bytes.as_ref(),
        }
    }

    /// The total wire size of this packet's frame (tag + payload).
    pub fn wire_size(&self) -> usize {
        TAG_SIZE + self.payload().len()
    }

    /// Encode this packet into a standalone frame.
    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_packet(self, &mut dst);
        dst.freeze()
    }
}

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────────────┐
/// │ Tag (1B)     │ Payload                  │
/// │ 0x00 text    │ UTF-8 text or raw bytes  │
/// │ 0x01 binary  │ (remainder of the frame) │
/// └──────────────┴──────────────────────────┘
/// ```
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) {
    dst.reserve(packet.wire_size());
    dst.put_u8(packet.kind().tag());
    dst.put_slice(packet.payload());
}

/// Decode a frame from a borrowed buffer.
///
/// The whole slice is one frame: message boundaries come from the connection.
pub fn decode_packet(frame: &[u8]) -> Result<Packet> {
    let (&tag, payload) = frame.split_first().ok_or(FrameError::EmptyFrame)?;
    match PayloadKind::from_tag(tag)? {
        PayloadKind::Text => Ok(Packet::Text(std::str::from_utf8(payload)?.to_owned())),
        PayloadKind::Binary => Ok(Packet::Binary(Bytes::copy_from_slice(payload))),
    }
}

/// Decode an owned frame. Binary payloads share the input allocation.
pub fn decode_frame(mut frame: Bytes) -> Result<Packet> {
    if frame.is_empty() {
        return Err(FrameError::EmptyFrame);
    }
    let tag = frame[0];
    let kind = PayloadKind::from_tag(tag)?;
    let payload = frame.split_off(TAG_SIZE);
    match kind {
        PayloadKind::Text => Ok(Packet::Text(std::str::from_utf8(&payload)?.to_owned())),
        PayloadKind::Binary => Ok(Packet::Binary(payload)),
    }
}
