//! Blocking owner for one transport.
//!
//! A [`Session`] drives a [`TcpTransport`] from its connection's event
//! channel, queues inbound packets, and keeps a write buffer for packets sent
//! while a batch is in flight. The buffer is flushed as one batch as soon as
//! the transport drains. While writes are buffered, a blocked receive wakes
//! every few milliseconds to flush, so an ack completing on another thread
//! does not wait for inbound traffic.

use std::collections::VecDeque;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tagwire_frame::{FrameConfig, Packet};
use tagwire_transport::{
    tcp_connection, Connection, ConnectionEvent, StreamConnection, TcpTransport, Transport,
    TransportError, TransportHandler, TransportRequest,
};
use tracing::{debug, warn};

const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Session over a blocking TCP stream.
pub type TcpSession = Session<StreamConnection<TcpStream>>;

#[derive(Default)]
struct Inbox {
    packets: Mutex<VecDeque<Packet>>,
    failure: Mutex<Option<TransportError>>,
    closed: AtomicBool,
    decode_errors: AtomicUsize,
}

impl TransportHandler for Inbox {
    fn on_packet(&self, packet: Packet) {
        lock(&self.packets).push_back(packet);
    }

    fn on_error(&self, error: TransportError) {
        if let TransportError::Decode(err) = &error {
            warn!(error = %err, "inbound frame rejected");
            self.decode_errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
        *lock(&self.failure) = Some(error);
        self.closed.store(true, Ordering::Release);
    }

    fn on_close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn on_drain(&self) {
        debug!("transport drained");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns one transport and its event stream.
///
/// Dropping a session ends its connection.
pub struct Session<C: Connection> {
    transport: TcpTransport<C>,
    events: Receiver<ConnectionEvent>,
    inbox: Arc<Inbox>,
    write_buffer: Vec<Packet>,
}

impl<C: Connection> Session<C> {
    /// Bind a session to a connection and the channel carrying its events.
    pub fn new(
        request: TransportRequest<C>,
        events: Receiver<ConnectionEvent>,
    ) -> Result<Self, TransportError> {
        let inbox = Arc::new(Inbox::default());
        let transport = TcpTransport::new(request, inbox.clone())?;
        Ok(Self {
            transport,
            events,
            inbox,
            write_buffer: Vec::new(),
        })
    }

    /// Queue packets and write them as soon as the transport is writable.
    pub fn send(&mut self, packets: impl IntoIterator<Item = Packet>) {
        self.write_buffer.extend(packets);
        self.flush();
    }

    /// Packets waiting for the current batch to drain.
    pub fn pending_writes(&self) -> usize {
        self.write_buffer.len()
    }

    /// Inbound frames rejected as malformed so far.
    pub fn decode_errors(&self) -> usize {
        self.inbox.decode_errors.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    pub fn transport(&self) -> &TcpTransport<C> {
        &self.transport
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.transport.remote_addr()
    }

    /// Wait for the next packet.
    ///
    /// Returns `Ok(None)` once the remote end has closed the connection.
    pub fn recv(&mut self) -> Result<Option<Packet>, TransportError> {
        self.recv_until(None)
    }

    /// Wait for the next packet, failing with `TimedOut` after `timeout`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Packet>, TransportError> {
        self.recv_until(Some(Instant::now() + timeout))
    }

    /// Request termination of the connection.
    pub fn close(&mut self) {
        self.write_buffer.clear();
        self.transport.close(None);
    }

    fn recv_until(&mut self, deadline: Option<Instant>) -> Result<Option<Packet>, TransportError> {
        loop {
            self.flush();

            if let Some(packet) = lock(&self.inbox.packets).pop_front() {
                return Ok(Some(packet));
            }
            if let Some(err) = lock(&self.inbox.failure).take() {
                return Err(err);
            }
            if self.inbox.closed.load(Ordering::Acquire) {
                return Ok(None);
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "timed out waiting for packet",
                )));
            }
            let poll = (!self.write_buffer.is_empty()).then(|| now + DRAIN_POLL);
            let wake = match (deadline, poll) {
                (Some(deadline), Some(poll)) => Some(deadline.min(poll)),
                (deadline, poll) => deadline.or(poll),
            };

            let event = match wake {
                None => self.events.recv().ok(),
                Some(wake) => match self.events.recv_timeout(wake.saturating_duration_since(now)) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => None,
                },
            };

            match event {
                Some(event) => self.transport.on_connection_event(event),
                // Event source gone without an end event.
                None => self.transport.on_connection_end(),
            }
        }
    }

    fn flush(&mut self) {
        if self.write_buffer.is_empty() || !self.transport.is_writable() {
            return;
        }
        let batch = std::mem::take(&mut self.write_buffer);
        debug!(count = batch.len(), "flushing write buffer");
        self.transport.send(batch);
    }
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        if !self.transport.is_closed() {
            self.transport.close(None);
        }
    }
}

impl TcpSession {
    /// Wrap an accepted TCP stream.
    pub fn accept(stream: TcpStream, config: FrameConfig) -> Result<Self, TransportError> {
        let peer = stream.peer_addr()?;
        let (conn, events) = tcp_connection(stream, config)?;
        Self::new(TransportRequest::new(conn).with_remote_addr(peer), events)
    }

    /// Connect to a listening tagwire endpoint.
    pub fn connect(addr: impl ToSocketAddrs, config: FrameConfig) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        let peer = stream.peer_addr()?;
        let (conn, events) = tcp_connection(stream, config)?;
        Self::new(TransportRequest::new(conn).with_remote_addr(peer), events)
    }
}
