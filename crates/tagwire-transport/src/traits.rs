use std::net::SocketAddr;

use bytes::Bytes;
use tagwire_frame::Packet;

use crate::error::TransportError;
use crate::gate::WriteAck;

/// Callback run once a close request has been issued.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Notifications a transport delivers to its owner.
///
/// Callbacks run on whichever thread drives the connection events, and
/// `on_drain` may run on the thread that completes a write.
pub trait TransportHandler: Send + Sync {
    /// A packet arrived from the remote end.
    fn on_packet(&self, packet: Packet);

    /// A data-level or connection-level failure.
    fn on_error(&self, error: TransportError);

    /// The remote end closed the connection cleanly.
    fn on_close(&self);

    /// The last send batch was fully acknowledged; the transport is writable.
    fn on_drain(&self) {}
}

/// Transport capability as seen by the owning session.
pub trait Transport {
    /// Transport name advertised during negotiation.
    fn name(&self) -> &'static str;

    /// Whether the transport can take over an upgraded connection.
    fn handles_upgrades(&self) -> bool {
        false
    }

    /// Whether the transport frames packets itself.
    fn supports_framing(&self) -> bool {
        false
    }

    /// True when a new send batch may be issued.
    fn is_writable(&self) -> bool;

    /// Write an ordered batch of packets. Only call while writable.
    fn send(&mut self, packets: Vec<Packet>);

    /// Request termination of the underlying connection.
    fn close(&mut self, on_closed: Option<CloseCallback>);
}

/// Inbound side of a connection, delivered in order by its driver.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// One complete inbound frame.
    Data(Bytes),
    /// The connection failed.
    Error(std::io::Error),
    /// The remote end closed cleanly.
    End,
}

/// Outbound side of an externally owned, message-oriented connection.
pub trait Connection {
    /// Queue one frame. The connection completes `ack` once the write is done.
    ///
    /// A connection that cannot complete the write drops `ack` and reports
    /// the failure as [`ConnectionEvent::Error`].
    fn write(&mut self, frame: Bytes, ack: WriteAck);

    /// Request termination. Fire-and-forget.
    fn end(&mut self);

    /// Whether the handle can still carry traffic.
    fn is_open(&self) -> bool {
        true
    }
}

/// What a transport is built from: the accepted connection and its metadata.
#[derive(Debug)]
pub struct TransportRequest<C> {
    pub connection: Option<C>,
    pub remote_addr: Option<SocketAddr>,
}

impl<C> TransportRequest<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection: Some(connection),
            remote_addr: None,
        }
    }

    /// A request that carries no connection handle.
    pub fn without_connection() -> Self {
        Self {
            connection: None,
            remote_addr: None,
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}
