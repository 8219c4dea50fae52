use std::fs;
use std::time::Duration;

use tagwire::TcpSession;
use tagwire_frame::{FrameConfig, Packet};
use tracing::debug;

use crate::cmd::echo::peer_label;
use crate::cmd::SendArgs;
use crate::exit::{transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat, config: FrameConfig) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let packet = resolve_payload(&args)?;

    let mut session = TcpSession::connect(args.addr.as_str(), config)
        .map_err(|err| transport_error("connect failed", err))?;
    debug!(
        kind = packet.kind().as_str(),
        size = packet.payload().len(),
        "sending packet"
    );
    session.send([packet]);

    if args.wait {
        let response = session
            .recv_timeout(wait_timeout)
            .map_err(|err| transport_error("receive failed", err))?;
        match response {
            Some(packet) => print_packet(&packet, &peer_label(&session), format),
            None => {
                session.close();
                return Err(CliError::new(
                    FAILURE,
                    "connection closed before a response arrived",
                ));
            }
        }
    }

    session.close();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Packet> {
    if let Some(text) = &args.text {
        return Ok(Packet::text(text.as_str()));
    }
    if let Some(encoded) = &args.hex {
        let data = hex::decode(encoded.trim())
            .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")))?;
        return Ok(Packet::binary(data));
    }
    if let Some(path) = &args.file {
        let data = fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return Ok(Packet::binary(data));
    }
    Ok(Packet::text(""))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
