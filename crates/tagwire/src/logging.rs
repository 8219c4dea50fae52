//! Stderr diagnostics for the CLI. Stdout carries packet output only.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Filter directives that override `--log-level`, e.g.
/// `TAGWIRE_LOG=tagwire_transport=trace,info`.
pub const LOG_ENV: &str = "TAGWIRE_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Directives from the environment win when they parse; otherwise every
/// target logs at `level`.
fn build_filter(level: LogLevel, directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level.directive()))
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let directives = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level, directives.as_deref()))
        .with_writer(std::io::stderr)
        .with_ansi(false);

    let installed = match format {
        LogFormat::Text => builder.compact().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    if let Err(err) = installed {
        eprintln!("warning: logging disabled: {err}");
    }
}
