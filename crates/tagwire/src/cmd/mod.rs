use std::io;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use tagwire::TcpSession;
use tagwire_frame::{FrameConfig, Packet};
use tagwire_transport::TransportError;

use crate::exit::{io_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an echo server.
    Echo(EchoArgs),
    /// Send a single packet.
    Send(SendArgs),
    /// Listen and print received packets.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: FrameConfig) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, config),
        Command::Send(args) => send::run(args, format, config),
        Command::Listen(args) => listen::run(args, format, config),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (e.g. 127.0.0.1:7878).
    pub addr: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to.
    pub addr: String,
    /// Text payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub text: Option<String>,
    /// Binary payload as hex.
    #[arg(long, conflicts_with_all = ["text", "file"])]
    pub hex: Option<String>,
    /// Read a binary payload from file.
    #[arg(long, conflicts_with_all = ["text", "hex"])]
    pub file: Option<PathBuf>,
    /// Wait for one response packet and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind.
    pub addr: String,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Bind a listener that [`accept_until_stopped`] can poll.
pub(crate) fn bind_listener(addr: &str) -> CliResult<TcpListener> {
    let listener = TcpListener::bind(addr).map_err(|err| io_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| io_error("bind failed", err))?;
    Ok(listener)
}

/// Wait for the next connection, or `None` once `running` is cleared.
///
/// Returned streams are blocking regardless of the listener mode.
pub(crate) fn accept_until_stopped(
    listener: &TcpListener,
    running: &AtomicBool,
) -> Option<io::Result<TcpStream>> {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => return Some(stream.set_nonblocking(false).map(|()| stream)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Some(Err(err)),
        }
    }
    None
}

/// Receive on `session` until a packet arrives, the peer goes away, or
/// `running` is cleared.
pub(crate) fn recv_until_stopped(
    session: &mut TcpSession,
    running: &AtomicBool,
) -> Result<Option<Packet>, TransportError> {
    while running.load(Ordering::SeqCst) {
        match session.recv_timeout(POLL_INTERVAL) {
            Err(TransportError::Io(err)) if err.kind() == io::ErrorKind::TimedOut => continue,
            other => return other,
        }
    }
    Ok(None)
}
