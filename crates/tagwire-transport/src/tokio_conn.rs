//! Connections driven by tokio tasks.
//!
//! A writer task owns the write half and acknowledges a frame once
//! `FramedWrite` has flushed it. A reader task yields inbound frames. Both
//! report into one bounded event channel, which the owner drains in order;
//! the reader stops pulling from the stream while that channel is full.
//!
//! Outbound operations need no bound of their own: the backpressure gate
//! keeps at most one batch in flight.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tagwire_frame::{FrameConfig, FrameError, MessageCodec};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::gate::WriteAck;
use crate::traits::{Connection, ConnectionEvent};

enum WriteOp {
    Frame(Bytes, WriteAck),
    End,
}

/// Handle to a connection whose I/O runs on tokio tasks.
#[derive(Debug)]
pub struct TokioConnection {
    ops: mpsc::UnboundedSender<WriteOp>,
    ended: bool,
}

impl Connection for TokioConnection {
    fn write(&mut self, frame: Bytes, ack: WriteAck) {
        if self.ended || self.ops.send(WriteOp::Frame(frame, ack)).is_err() {
            debug!("write on finished connection dropped");
        }
    }

    fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            let _ = self.ops.send(WriteOp::End);
        }
    }

    fn is_open(&self) -> bool {
        !self.ended && !self.ops.is_closed()
    }
}

impl std::fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOp::Frame(frame, _) => f.debug_tuple("Frame").field(&frame.len()).finish(),
            WriteOp::End => f.write_str("End"),
        }
    }
}

/// Split `io` and spawn its reader and writer tasks on the current runtime.
pub fn spawn_connection<T>(
    io: T,
    config: &FrameConfig,
) -> (TokioConnection, mpsc::Receiver<ConnectionEvent>)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(io);
    let (events_tx, events_rx) = mpsc::channel(config.inbound_bound());
    let (ops_tx, ops_rx) = mpsc::unbounded_channel();

    let reader = FramedRead::new(read_half, MessageCodec::with_config(config));
    tokio::spawn(read_loop(reader, events_tx.clone()));

    let writer = FramedWrite::new(write_half, MessageCodec::with_config(config));
    tokio::spawn(write_loop(writer, ops_rx, events_tx));

    (
        TokioConnection {
            ops: ops_tx,
            ended: false,
        },
        events_rx,
    )
}

async fn read_loop<R>(
    mut reader: FramedRead<R, MessageCodec>,
    events: mpsc::Sender<ConnectionEvent>,
) where
    R: AsyncRead + Unpin,
{
    let last = loop {
        match reader.next().await {
            Some(Ok(frame)) => {
                if events.send(ConnectionEvent::Data(frame)).await.is_err() {
                    return;
                }
            }
            Some(Err(err)) => break ConnectionEvent::Error(into_io(err)),
            None => break ConnectionEvent::End,
        }
    };
    let _ = events.send(last).await;
}

async fn write_loop<W>(
    mut writer: FramedWrite<W, MessageCodec>,
    mut ops: mpsc::UnboundedReceiver<WriteOp>,
    events: mpsc::Sender<ConnectionEvent>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(op) = ops.recv().await {
        match op {
            WriteOp::Frame(frame, ack) => match writer.send(frame).await {
                Ok(()) => ack.complete(),
                Err(err) => {
                    debug!(error = %err, "write failed");
                    let _ = events.send(ConnectionEvent::Error(into_io(err))).await;
                    return;
                }
            },
            WriteOp::End => {
                if let Err(err) = SinkExt::<Bytes>::close(&mut writer).await {
                    debug!(error = %err, "stream shutdown failed");
                }
                return;
            }
        }
    }
}

fn into_io(err: FrameError) -> std::io::Error {
    match err {
        FrameError::Io(io) => io,
        other => std::io::Error::other(other),
    }
}
