use std::net::TcpStream;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tagwire::TcpSession;
use tagwire_frame::FrameConfig;
use tracing::{info, warn};

use crate::cmd::{
    accept_until_stopped, bind_listener, install_ctrlc_handler, recv_until_stopped, EchoArgs,
};
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: EchoArgs, config: FrameConfig) -> CliResult<i32> {
    let listener = bind_listener(&args.addr)?;
    info!(addr = ?listener.local_addr().ok(), "echo server listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut peers = Vec::new();
    while let Some(stream) = accept_until_stopped(&listener, &running) {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        let config = config.clone();
        let running = running.clone();
        peers.push(std::thread::spawn(move || serve_peer(stream, config, &running)));
        peers.retain(|peer| !peer.is_finished());
    }

    for peer in peers {
        let _ = peer.join();
    }
    info!("echo server stopped");
    Ok(SUCCESS)
}

fn serve_peer(stream: TcpStream, config: FrameConfig, running: &AtomicBool) {
    let mut session = match TcpSession::accept(stream, config) {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "failed to set up transport");
            return;
        }
    };
    let peer = peer_label(&session);
    info!(%peer, "peer connected");

    loop {
        match recv_until_stopped(&mut session, running) {
            Ok(Some(packet)) => {
                info!(
                    %peer,
                    kind = packet.kind().as_str(),
                    size = packet.payload().len(),
                    "echoing packet"
                );
                session.send([packet]);
            }
            Ok(None) => break,
            Err(err) => {
                warn!(%peer, error = %err, "connection failed");
                break;
            }
        }
    }

    session.close();
    info!(%peer, decode_errors = session.decode_errors(), "peer disconnected");
}

pub(crate) fn peer_label(session: &TcpSession) -> String {
    session
        .remote_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
