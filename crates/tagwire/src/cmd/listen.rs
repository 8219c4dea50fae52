use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tagwire::TcpSession;
use tagwire_frame::FrameConfig;
use tracing::{info, warn};

use crate::cmd::echo::peer_label;
use crate::cmd::{
    accept_until_stopped, bind_listener, install_ctrlc_handler, recv_until_stopped, ListenArgs,
};
use crate::exit::{io_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat, config: FrameConfig) -> CliResult<i32> {
    let listener = bind_listener(&args.addr)?;
    info!(addr = ?listener.local_addr().ok(), "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    // Peers are served one at a time.
    while let Some(stream) = accept_until_stopped(&listener, &running) {
        let stream = stream.map_err(|err| io_error("accept failed", err))?;
        let mut session = TcpSession::accept(stream, config.clone())
            .map_err(|err| transport_error("transport setup failed", err))?;
        let peer = peer_label(&session);
        info!(%peer, "peer connected");

        loop {
            let packet = match recv_until_stopped(&mut session, &running) {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(err) => {
                    warn!(%peer, error = %err, "connection failed");
                    break;
                }
            };

            print_packet(&packet, &peer, format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                session.close();
                return Ok(SUCCESS);
            }
        }

        info!(%peer, "peer disconnected");
    }

    Ok(SUCCESS)
}
