use std::fmt;
use std::io;

use tagwire_frame::FrameError;
use tagwire_transport::TransportError;

// Exit codes follow the sysexits-style ranges used across our CLIs.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::EmptyFrame
        | FrameError::UnknownTag(_)
        | FrameError::InvalidText(_)
        | FrameError::MessageTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::InvalidMagic => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) | TransportError::Connection(source) => {
            io_error(context, source)
        }
        TransportError::Decode(err) | TransportError::Frame(err) => frame_error(context, err),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_timeout_code() {
        let err = transport_error(
            "receive failed",
            TransportError::Io(io::Error::from(io::ErrorKind::TimedOut)),
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("receive failed: "));
    }

    #[test]
    fn decode_errors_are_invalid_data() {
        let err = transport_error(
            "receive failed",
            TransportError::Decode(FrameError::UnknownTag(7)),
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn missing_connection_is_transport_error() {
        let err = transport_error("bind failed", TransportError::NoConnection);
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn refused_connection_is_failure() {
        let err = transport_error(
            "connect failed",
            TransportError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)),
        );
        assert_eq!(err.code, FAILURE);
    }
}
