//! Blocking connections over byte streams.
//!
//! Each tagged frame travels as one delimited message. Outbound frames are
//! acknowledged as soon as the write and flush calls return, which means the
//! bytes reached the OS socket buffer, not the peer.
//!
//! Inbound messages are pumped by a reader thread into a bounded channel.
//! When the owner stops consuming, the reader stops reading and the peer is
//! held back by TCP flow control.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bytes::Bytes;
use tagwire_frame::{FrameConfig, FrameError, MessageReader, MessageWriter};
use tracing::debug;

use crate::error::Result;
use crate::gate::WriteAck;
use crate::traits::{Connection, ConnectionEvent};

/// Write half of a byte stream that can signal end-of-stream to the peer.
pub trait EndStream: Write {
    /// Half-close: no more writes, reads continue.
    fn end_stream(&mut self) -> std::io::Result<()>;

    /// Tear down both directions so a blocked reader returns.
    fn abort_stream(&mut self) -> std::io::Result<()>;
}

impl EndStream for TcpStream {
    fn end_stream(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }

    fn abort_stream(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[cfg(unix)]
impl EndStream for std::os::unix::net::UnixStream {
    fn end_stream(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }

    fn abort_stream(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Write failure parked for the reader side to report.
///
/// The owner drives writes and drains events on the same thread, so a write
/// failure is never pushed into the bounded event channel directly. The
/// connection parks it here and aborts the stream; the [`EventSource`]
/// reports it as its terminal event once the reader returns.
#[derive(Clone, Debug, Default)]
pub struct WriteFailure {
    slot: Arc<Mutex<Option<std::io::Error>>>,
}

impl WriteFailure {
    /// Record `err` unless a failure is already parked.
    pub fn set(&self, err: std::io::Error) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Take the parked failure, if any.
    pub fn take(&self) -> Option<std::io::Error> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).take()
    }
}

/// Message-oriented connection over the write half of a byte stream.
pub struct StreamConnection<W> {
    writer: MessageWriter<W>,
    failure: WriteFailure,
    open: bool,
}

impl<W: EndStream> StreamConnection<W> {
    /// Wrap `inner`, parking write failures in `failure`.
    pub fn new(inner: W, config: FrameConfig, failure: WriteFailure) -> Self {
        Self {
            writer: MessageWriter::with_config(inner, config),
            failure,
            open: true,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    fn fail(&mut self, err: FrameError) {
        self.open = false;
        let err = match err {
            FrameError::Io(io) => io,
            other => std::io::Error::other(other),
        };
        debug!(error = %err, "write failed");
        self.failure.set(err);
        if let Err(err) = self.writer.get_mut().abort_stream() {
            debug!(error = %err, "stream abort failed");
        }
    }
}

impl<W: EndStream> Connection for StreamConnection<W> {
    fn write(&mut self, frame: Bytes, ack: WriteAck) {
        if !self.open {
            debug!(size = frame.len(), "write on closed stream dropped");
            return;
        }
        match self.writer.write_frame(&frame) {
            Ok(()) => ack.complete(),
            Err(err) => self.fail(err),
        }
    }

    fn end(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(err) = self.writer.get_mut().end_stream() {
            debug!(error = %err, "stream shutdown failed");
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Turns a message reader into connection events.
///
/// Yields `Data` per message, then exactly one `End` or `Error`. A parked
/// write failure takes precedence over the reader's own terminal event.
pub struct EventSource<R> {
    reader: MessageReader<R>,
    failure: WriteFailure,
    done: bool,
}

impl<R: Read> EventSource<R> {
    pub fn new(inner: R, config: FrameConfig) -> Self {
        Self {
            reader: MessageReader::with_config(inner, config),
            failure: WriteFailure::default(),
            done: false,
        }
    }

    /// Report failures parked by the paired [`StreamConnection`].
    pub fn with_failure(mut self, failure: WriteFailure) -> Self {
        self.failure = failure;
        self
    }
}

impl<R: Read> Iterator for EventSource<R> {
    type Item = ConnectionEvent;

    fn next(&mut self) -> Option<ConnectionEvent> {
        if self.done {
            return None;
        }
        let event = match self.reader.read_frame() {
            Ok(Some(frame)) => return Some(ConnectionEvent::Data(frame)),
            Ok(None) => ConnectionEvent::End,
            Err(FrameError::Io(io)) => ConnectionEvent::Error(io),
            Err(other) => ConnectionEvent::Error(std::io::Error::other(other)),
        };
        self.done = true;
        Some(match self.failure.take() {
            Some(err) => ConnectionEvent::Error(err),
            None => event,
        })
    }
}

/// Pump `source` into `events` on a dedicated thread.
///
/// Blocks while `events` is full, so the thread reads no further ahead than
/// the channel bound.
pub fn spawn_reader<R>(
    source: EventSource<R>,
    events: SyncSender<ConnectionEvent>,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        for event in source {
            if events.send(event).is_err() {
                break;
            }
        }
    })
}

/// Wrap an accepted or connected TCP stream.
///
/// Returns the connection for the transport and the event stream the owner
/// feeds to [`crate::TcpTransport::on_connection_event`]. At most
/// [`FrameConfig::inbound_bound`] messages are queued ahead of the owner.
pub fn tcp_connection(
    stream: TcpStream,
    config: FrameConfig,
) -> Result<(StreamConnection<TcpStream>, Receiver<ConnectionEvent>)> {
    stream.set_read_timeout(config.read_timeout)?;
    stream.set_write_timeout(config.write_timeout)?;
    let read_half = stream.try_clone()?;

    let failure = WriteFailure::default();
    let (tx, rx) = mpsc::sync_channel(config.inbound_bound());
    let source = EventSource::new(read_half, config.clone()).with_failure(failure.clone());
    spawn_reader(source, tx);
    Ok((StreamConnection::new(stream, config, failure), rx))
}

/// Connect to `addr` and wrap the stream.
pub fn connect_tcp(
    addr: impl std::net::ToSocketAddrs,
    config: FrameConfig,
) -> Result<(StreamConnection<TcpStream>, Receiver<ConnectionEvent>)> {
    let stream = TcpStream::connect(addr)?;
    debug!(peer = ?stream.peer_addr().ok(), "connected");
    tcp_connection(stream, config)
}
