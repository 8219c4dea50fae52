//! Backpressure-aware packet transport over message-oriented connections.
//!
//! [`TcpTransport`] binds to one externally owned [`Connection`], encodes
//! outbound packets as type-tagged frames and decodes inbound ones. Flow
//! control is a single writable flag: a send batch makes the transport
//! non-writable until every frame has been acknowledged, then the owner
//! gets one `on_drain`.
//!
//! Connection flavours:
//! - [`stream`]: blocking, over std TCP/Unix streams
//! - `tokio_conn` (feature `async`): tokio tasks over any async stream

pub mod adapter;
pub mod error;
pub mod gate;
pub mod stream;
#[cfg(feature = "async")]
pub mod tokio_conn;
pub mod traits;

pub use adapter::{TcpTransport, TransportState};
pub use error::{Result, TransportError};
pub use gate::{BackpressureGate, WriteAck};
pub use stream::{
    connect_tcp, tcp_connection, EndStream, EventSource, StreamConnection, WriteFailure,
};
#[cfg(feature = "async")]
pub use tokio_conn::{spawn_connection, TokioConnection};
pub use traits::{
    CloseCallback, Connection, ConnectionEvent, Transport, TransportHandler, TransportRequest,
};
