//! Minimal echo server: accepts one peer and echoes packets back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:7878 --text hello --wait

use std::net::TcpListener;

use tagwire::frame::FrameConfig;
use tagwire::TcpSession;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:7878")?;
    eprintln!("Listening on {}", listener.local_addr()?);

    let (stream, _) = listener.accept()?;
    let mut session = TcpSession::accept(stream, FrameConfig::default())?;
    eprintln!("Peer connected: {:?}", session.remote_addr());

    loop {
        match session.recv() {
            Ok(Some(packet)) => {
                eprintln!(
                    "Received {} packet, {} bytes",
                    packet.kind().as_str(),
                    packet.payload().len()
                );
                session.send([packet]);
            }
            Ok(None) => {
                eprintln!("Peer disconnected");
                break;
            }
            Err(e) => {
                eprintln!("Connection failed: {e}");
                break;
            }
        }
    }

    Ok(())
}
