use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tagwire_frame::{decode_frame, encode_packet, Packet};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::gate::BackpressureGate;
use crate::traits::{
    CloseCallback, Connection, ConnectionEvent, Transport, TransportHandler, TransportRequest,
};

/// Observable state of a [`TcpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Writable, no batch in flight.
    Open,
    /// A batch is waiting for acknowledgement.
    Sending,
    /// The connection ended or failed. Terminal.
    Closed,
}

/// Packet transport over a persistent message-oriented connection.
///
/// Bound 1:1 to its connection for the connection's lifetime. Driven by the
/// connection's events through [`TcpTransport::on_connection_event`].
pub struct TcpTransport<C> {
    conn: C,
    gate: BackpressureGate,
    handler: Arc<dyn TransportHandler>,
    remote_addr: Option<SocketAddr>,
    closed: bool,
    buf: BytesMut,
}

impl<C: Connection> TcpTransport<C> {
    /// Bind a transport to the connection carried by `request`.
    ///
    /// Fails with [`TransportError::NoConnection`] when the request has no
    /// connection or the connection is no longer open.
    pub fn new(request: TransportRequest<C>, handler: Arc<dyn TransportHandler>) -> Result<Self> {
        let conn = match request.connection {
            Some(conn) if conn.is_open() => conn,
            _ => return Err(TransportError::NoConnection),
        };

        debug!(remote = ?request.remote_addr, "tcp transport bound");

        Ok(Self {
            conn,
            gate: BackpressureGate::new(Arc::clone(&handler)),
            handler,
            remote_addr: request.remote_addr,
            closed: false,
            buf: BytesMut::new(),
        })
    }

    pub fn state(&self) -> TransportState {
        if self.closed {
            TransportState::Closed
        } else if self.gate.is_writable() {
            TransportState::Open
        } else {
            TransportState::Sending
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Like [`Transport::send`], but reports a closed transport.
    pub fn try_send(&mut self, packets: Vec<Packet>) -> Result<()> {
        if self.closed {
            return Err(TransportError::AlreadyClosed);
        }
        self.write_batch(packets);
        Ok(())
    }

    /// Feed one connection event.
    pub fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Data(frame) => self.on_connection_data(frame),
            ConnectionEvent::Error(err) => self.on_connection_error(err),
            ConnectionEvent::End => self.on_connection_end(),
        }
    }

    /// Decode an inbound frame and hand the packet to the owner.
    ///
    /// A malformed frame is reported as a decode error; the connection stays
    /// open and the writable state is untouched.
    pub fn on_connection_data(&mut self, frame: Bytes) {
        if self.closed {
            trace!(size = frame.len(), "data after close ignored");
            return;
        }

        match decode_frame(frame) {
            Ok(packet) => {
                trace!(
                    kind = packet.kind().as_str(),
                    size = packet.payload().len(),
                    "packet received"
                );
                self.handler.on_packet(packet);
            }
            Err(err) => {
                debug!(error = %err, "malformed frame");
                self.handler.on_error(TransportError::Decode(err));
            }
        }
    }

    /// The connection failed; the transport closes without recovery.
    pub fn on_connection_error(&mut self, err: std::io::Error) {
        if self.closed {
            trace!(error = %err, "error after close ignored");
            return;
        }
        debug!(error = %err, "connection error");
        self.mark_closed();
        self.handler.on_error(TransportError::Connection(err));
    }

    /// The remote end closed cleanly.
    pub fn on_connection_end(&mut self) {
        if self.closed {
            trace!("end after close ignored");
            return;
        }
        debug!("connection ended");
        self.mark_closed();
        self.handler.on_close();
    }

    /// Borrow the underlying connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    fn write_batch(&mut self, packets: Vec<Packet>) {
        let batch = self.gate.begin_send(packets.len());
        for packet in packets {
            encode_packet(&packet, &mut self.buf);
            let frame = self.buf.split().freeze();
            debug!(
                batch,
                kind = packet.kind().as_str(),
                size = frame.len(),
                "writing frame"
            );
            self.conn.write(frame, self.gate.ack(batch));
        }
    }

    fn mark_closed(&mut self) {
        self.closed = true;
        self.gate.shut();
    }
}

impl<C: Connection> Transport for TcpTransport<C> {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn handles_upgrades(&self) -> bool {
        true
    }

    fn supports_framing(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        !self.closed && self.gate.is_writable()
    }

    fn send(&mut self, packets: Vec<Packet>) {
        if self.closed {
            trace!(count = packets.len(), "send after close ignored");
            return;
        }
        self.write_batch(packets);
    }

    fn close(&mut self, on_closed: Option<CloseCallback>) {
        if self.closed {
            trace!("close after close ignored");
        } else {
            debug!("closing");
            self.conn.end();
        }
        if let Some(callback) = on_closed {
            callback();
        }
    }
}

impl<C> std::fmt::Debug for TcpTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("remote_addr", &self.remote_addr)
            .field("gate", &self.gate)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use tagwire_frame::FrameError;

    use super::*;
    use crate::gate::WriteAck;

    /// Records writes and holds their acks until the test completes them.
    #[derive(Default)]
    struct FakeConnection {
        writes: Vec<Bytes>,
        acks: Vec<WriteAck>,
        ended: usize,
        closed: bool,
    }

    impl FakeConnection {
        fn ack_all(&mut self) {
            for ack in self.acks.drain(..) {
                ack.complete();
            }
        }
    }

    impl Connection for FakeConnection {
        fn write(&mut self, frame: Bytes, ack: WriteAck) {
            self.writes.push(frame);
            self.acks.push(ack);
        }

        fn end(&mut self) {
            self.ended += 1;
        }

        fn is_open(&self) -> bool {
            !self.closed
        }
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Packet(Packet),
        DecodeError,
        ConnectionError,
        Close,
        Drain,
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Seen>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Seen> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }

        fn drains(&self) -> usize {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|s| **s == Seen::Drain)
                .count()
        }
    }

    impl TransportHandler for Recorder {
        fn on_packet(&self, packet: Packet) {
            self.seen.lock().unwrap().push(Seen::Packet(packet));
        }

        fn on_error(&self, error: TransportError) {
            let seen = match error {
                TransportError::Decode(_) => Seen::DecodeError,
                _ => Seen::ConnectionError,
            };
            self.seen.lock().unwrap().push(seen);
        }

        fn on_close(&self) {
            self.seen.lock().unwrap().push(Seen::Close);
        }

        fn on_drain(&self) {
            self.seen.lock().unwrap().push(Seen::Drain);
        }
    }

    fn transport() -> (TcpTransport<FakeConnection>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let transport = TcpTransport::new(
            TransportRequest::new(FakeConnection::default()),
            recorder.clone(),
        )
        .unwrap();
        (transport, recorder)
    }

    #[test]
    fn construction_requires_connection() {
        let recorder = Arc::new(Recorder::default());
        let err = TcpTransport::<FakeConnection>::new(
            TransportRequest::without_connection(),
            recorder.clone(),
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::NoConnection));

        let dead = FakeConnection {
            closed: true,
            ..FakeConnection::default()
        };
        let err = TcpTransport::new(TransportRequest::new(dead), recorder).unwrap_err();
        assert!(matches!(err, TransportError::NoConnection));
    }

    #[test]
    fn advertises_capabilities() {
        let (transport, _) = transport();
        assert_eq!(transport.name(), "tcp");
        assert!(transport.handles_upgrades());
        assert!(transport.supports_framing());
        assert_eq!(transport.state(), TransportState::Open);
    }

    #[test]
    fn send_writes_tagged_frame_and_drains_once() {
        let (mut transport, recorder) = transport();

        transport.send(vec![Packet::text("hi")]);
        assert_eq!(
            transport.connection().writes,
            vec![Bytes::from_static(&[0x00, b'h', b'i'])]
        );
        assert!(!transport.is_writable());
        assert_eq!(transport.state(), TransportState::Sending);

        transport.conn.ack_all();
        assert!(transport.is_writable());
        assert_eq!(recorder.drains(), 1);
    }

    #[test]
    fn batch_frames_written_in_order() {
        let (mut transport, recorder) = transport();
        let packets = vec![
            Packet::text("p1"),
            Packet::binary(vec![2u8]),
            Packet::text("p3"),
        ];
        let expected: Vec<Bytes> = packets.iter().map(Packet::encode).collect();

        transport.send(packets);
        assert_eq!(transport.connection().writes, expected);

        // Writable only once every frame of the batch is acknowledged.
        let mut acks = std::mem::take(&mut transport.conn.acks);
        let last = acks.pop().unwrap();
        for ack in acks {
            ack.complete();
        }
        assert!(!transport.is_writable());
        assert_eq!(recorder.drains(), 0);

        last.complete();
        assert!(transport.is_writable());
        assert_eq!(recorder.drains(), 1);
    }

    #[test]
    fn inbound_binary_frame_forwarded() {
        let (mut transport, recorder) = transport();

        transport.on_connection_event(ConnectionEvent::Data(Bytes::from_static(&[
            0x01, 0xDE, 0xAD,
        ])));

        assert_eq!(
            recorder.take(),
            vec![Seen::Packet(Packet::binary(vec![0xDE, 0xAD]))]
        );
    }

    #[test]
    fn malformed_frame_reported_without_closing() {
        let (mut transport, recorder) = transport();
        transport.send(vec![Packet::text("in flight")]);

        transport.on_connection_data(Bytes::new());
        transport.on_connection_data(Bytes::from_static(&[0x09, 0x00]));

        assert_eq!(recorder.take(), vec![Seen::DecodeError, Seen::DecodeError]);
        assert_eq!(transport.state(), TransportState::Sending);
        assert_eq!(transport.connection().ended, 0);

        transport.on_connection_data(Bytes::from_static(b"\x00still open"));
        assert_eq!(
            recorder.take(),
            vec![Seen::Packet(Packet::text("still open"))]
        );
    }

    #[test]
    fn decode_error_carries_frame_error() {
        struct Capture(Mutex<Option<TransportError>>);
        impl TransportHandler for Capture {
            fn on_packet(&self, _packet: Packet) {}
            fn on_error(&self, error: TransportError) {
                *self.0.lock().unwrap() = Some(error);
            }
            fn on_close(&self) {}
        }

        let capture = Arc::new(Capture(Mutex::new(None)));
        let mut transport =
            TcpTransport::new(TransportRequest::new(FakeConnection::default()), capture.clone())
                .unwrap();
        transport.on_connection_data(Bytes::new());

        let err = capture.0.lock().unwrap().take().unwrap();
        assert!(matches!(err, TransportError::Decode(FrameError::EmptyFrame)));
    }

    #[test]
    fn connection_error_closes_transport() {
        let (mut transport, recorder) = transport();

        transport.on_connection_event(ConnectionEvent::Error(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));

        assert_eq!(recorder.take(), vec![Seen::ConnectionError]);
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(!transport.is_writable());
    }

    #[test]
    fn end_is_clean_close() {
        let (mut transport, recorder) = transport();

        transport.on_connection_event(ConnectionEvent::End);

        assert_eq!(recorder.take(), vec![Seen::Close]);
        assert!(transport.is_closed());
    }

    #[test]
    fn events_after_close_ignored() {
        let (mut transport, recorder) = transport();
        transport.on_connection_end();
        recorder.take();

        transport.on_connection_data(Bytes::from_static(b"\x00late"));
        transport.on_connection_error(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        transport.on_connection_end();
        transport.send(vec![Packet::text("late")]);

        assert!(recorder.take().is_empty());
        assert!(transport.connection().writes.is_empty());
        assert!(matches!(
            transport.try_send(vec![Packet::text("late")]),
            Err(TransportError::AlreadyClosed)
        ));
    }

    #[test]
    fn ack_after_close_does_not_drain() {
        let (mut transport, recorder) = transport();
        transport.send(vec![Packet::text("x")]);
        transport.on_connection_end();

        transport.conn.ack_all();
        assert_eq!(recorder.take(), vec![Seen::Close]);
    }

    #[test]
    fn close_ends_connection_and_runs_callback() {
        let (mut transport, _) = transport();
        let called = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&called);
        transport.close(Some(Box::new(move || flag.store(true, Ordering::SeqCst))));

        assert_eq!(transport.connection().ended, 1);
        assert!(called.load(Ordering::SeqCst));
        // Teardown is not awaited; the end event closes the transport.
        assert_eq!(transport.state(), TransportState::Open);
    }

    #[test]
    fn close_after_closed_leaves_connection_alone() {
        let (mut transport, _) = transport();
        transport.on_connection_end();

        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        transport.close(Some(Box::new(move || flag.store(true, Ordering::SeqCst))));
        transport.close(None);

        assert_eq!(transport.connection().ended, 0);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn empty_batch_drains_immediately() {
        let (mut transport, recorder) = transport();
        transport.send(Vec::new());

        assert!(transport.is_writable());
        assert_eq!(recorder.drains(), 1);
    }
}
