//! Type-tagged packet framing.
//!
//! Every packet travels as one frame:
//! - A 1-byte type tag (`0x00` text, `0x01` binary)
//! - The payload bytes, verbatim
//!
//! Frames have no length of their own. Message-oriented connections deliver
//! them whole; byte-stream connections wrap each frame with the delimiter in
//! [`delimit`].

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod delimit;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::MessageCodec;
pub use codec::{
    decode_frame, decode_packet, encode_packet, Packet, PayloadKind, TAG_BINARY, TAG_SIZE,
    TAG_TEXT,
};
pub use delimit::{
    read_message, write_message, FrameConfig, DEFAULT_INBOUND_CAPACITY, DEFAULT_MAX_MESSAGE,
    HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::MessageReader;
pub use writer::MessageWriter;
