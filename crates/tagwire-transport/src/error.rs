use tagwire_frame::FrameError;

/// Errors surfaced by the transport adapter.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No usable connection handle was supplied.
    #[error("no socket")]
    NoConnection,

    /// An inbound frame could not be decoded. The connection stays open.
    #[error("malformed inbound frame: {0}")]
    Decode(#[source] FrameError),

    /// The underlying connection failed and is unusable from now on.
    #[error("connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// The transport has already closed.
    #[error("transport already closed")]
    AlreadyClosed,

    /// A frame-level error while setting up a connection.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// An I/O error while setting up a connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
