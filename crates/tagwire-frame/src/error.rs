/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame arrived without its type tag byte.
    #[error("empty frame (missing type tag)")]
    EmptyFrame,

    /// The type tag is neither text (0x00) nor binary (0x01).
    #[error("unknown frame type tag 0x{0:02x}")]
    UnknownTag(u8),

    /// A text-tagged frame carried bytes that are not valid UTF-8.
    #[error("text frame is not valid utf-8: {0}")]
    InvalidText(#[from] std::str::Utf8Error),

    /// A delimited message header contains an invalid magic number.
    #[error("invalid message magic (expected 0x5457 \"TW\")")]
    InvalidMagic,

    /// A delimited message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for malformed frame content, as opposed to stream or I/O failures.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            FrameError::EmptyFrame | FrameError::UnknownTag(_) | FrameError::InvalidText(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
