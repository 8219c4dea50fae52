//! Echo server on tokio, one task per peer.
//!
//! Packets received while a batch is in flight are held back and written
//! as the next batch once the transport drains.
//!
//! Run with:
//!   cargo run --example async-echo-server --features async

use std::sync::{Arc, Mutex};

use tagwire::frame::{FrameConfig, Packet};
use tagwire::transport::{
    spawn_connection, TcpTransport, Transport, TransportError, TransportHandler,
    TransportRequest,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

#[derive(Default)]
struct Pending {
    packets: Mutex<Vec<Packet>>,
    drained: Notify,
}

impl TransportHandler for Pending {
    fn on_packet(&self, packet: Packet) {
        if let Ok(mut packets) = self.packets.lock() {
            packets.push(packet);
        }
    }

    fn on_error(&self, error: TransportError) {
        eprintln!("transport error: {error}");
    }

    fn on_close(&self) {
        eprintln!("peer closed");
    }

    fn on_drain(&self) {
        self.drained.notify_one();
    }
}

async fn serve(stream: TcpStream) -> Result<(), TransportError> {
    let peer = stream.peer_addr()?;
    let (conn, mut events) = spawn_connection(stream, &FrameConfig::default());
    let pending = Arc::new(Pending::default());
    let mut transport = TcpTransport::new(
        TransportRequest::new(conn).with_remote_addr(peer),
        pending.clone(),
    )?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => transport.on_connection_event(event),
                None => break,
            },
            _ = pending.drained.notified() => {}
        }
        if transport.is_closed() {
            break;
        }
        if transport.is_writable() {
            let batch = pending
                .packets
                .lock()
                .map(|mut packets| std::mem::take(&mut *packets))
                .unwrap_or_default();
            if !batch.is_empty() {
                transport.send(batch);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:7879").await?;
    eprintln!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        eprintln!("Peer connected: {peer}");
        tokio::spawn(async move {
            if let Err(e) = serve(stream).await {
                eprintln!("Peer {peer} failed: {e}");
            }
        });
    }
}
