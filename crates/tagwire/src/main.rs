mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use tagwire_frame::{FrameConfig, DEFAULT_MAX_MESSAGE};

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "tagwire", version, about = "Type-tagged packet transport CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). TAGWIRE_LOG directives take precedence.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Largest accepted message in bytes (tag + payload).
    #[arg(
        long,
        value_name = "BYTES",
        env = "TAGWIRE_MAX_MESSAGE",
        default_value_t = DEFAULT_MAX_MESSAGE,
        global = true
    )]
    max_message: usize,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_message_size: self.max_message,
            ..FrameConfig::default()
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let config = cli.frame_config();
    let result = cmd::run(cli.command, format, config);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from(["tagwire", "send", "127.0.0.1:7878", "--text", "hello"])
            .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "tagwire",
            "send",
            "127.0.0.1:7878",
            "--text",
            "hello",
            "--hex",
            "dead",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn max_message_flag_sets_frame_config() {
        let cli = Cli::try_parse_from([
            "tagwire",
            "--max-message",
            "1024",
            "listen",
            "127.0.0.1:0",
        ])
        .expect("listen args should parse");

        assert_eq!(cli.frame_config().max_message_size, 1024);
        assert!(matches!(cli.command, Command::Listen(_)));
    }
}
