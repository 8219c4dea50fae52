//! `tokio_util` codec for delimited messages.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_packet, Packet};
use crate::delimit::{read_message, write_message, FrameConfig};
use crate::error::{FrameError, Result};

/// Splits a byte stream into tagged frames and wraps outbound frames.
///
/// Decoding yields the raw frame; tag interpretation stays with the caller
/// so a bad tag never tears down the stream.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_message_size: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        read_message(src, self.max_message_size)
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<()> {
        if frame.len() > self.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: frame.len(),
                max: self.max_message_size,
            });
        }
        write_message(&frame, dst)
    }
}

impl<'a> Encoder<&'a Packet> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: &'a Packet, dst: &mut BytesMut) -> Result<()> {
        let mut frame = BytesMut::with_capacity(packet.wire_size());
        encode_packet(packet, &mut frame);
        Encoder::<Bytes>::encode(self, frame.freeze(), dst)
    }
}
