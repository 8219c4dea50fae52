use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_packet, Packet};
use crate::delimit::{write_message, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete delimited messages to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scratch: BytesMut::new(),
            config,
        }
    }

    /// Encode a packet and write it as one message (blocking).
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        encode_packet(packet, &mut scratch);
        let result = self.write_frame(&scratch);
        self.scratch = scratch;
        result
    }

    /// Write an already encoded frame as one message (blocking).
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: frame.len(),
                max: self.config.max_message_size,
            });
        }

        self.buf.clear();
        write_message(frame, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current message writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::decode_frame;
    use crate::delimit::{read_message, DEFAULT_MAX_MESSAGE};

    fn decode_all(bytes: Vec<u8>) -> Vec<Packet> {
        let mut wire = BytesMut::from(bytes.as_slice());
        let mut out = Vec::new();
        while let Some(frame) = read_message(&mut wire, DEFAULT_MAX_MESSAGE).unwrap() {
            out.push(decode_frame(frame).unwrap());
        }
        out
    }

    #[test]
    fn write_single_packet() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_packet(&Packet::text("hello")).unwrap();

        let packets = decode_all(writer.into_inner().into_inner());
        assert_eq!(packets, vec![Packet::text("hello")]);
    }

    #[test]
    fn write_preserves_order() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_packet(&Packet::text("one")).unwrap();
        writer.write_packet(&Packet::binary(vec![2u8])).unwrap();
        writer.write_packet(&Packet::text("three")).unwrap();

        let packets = decode_all(writer.into_inner().into_inner());
        assert_eq!(
            packets,
            vec![
                Packet::text("one"),
                Packet::binary(vec![2u8]),
                Packet::text("three")
            ]
        );
    }

    #[test]
    fn oversized_frame_rejected() {
        let cfg = FrameConfig {
            max_message_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = MessageWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.write_packet(&Packet::text("oversized")).unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { .. }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = MessageWriter::new(sink);

        writer.write_frame(b"\x00x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let mut writer = MessageWriter::new(FlakyWriter::new(ErrorKind::Interrupted));
        writer.write_packet(&Packet::text("retry")).unwrap();

        let packets = decode_all(writer.into_inner().data);
        assert_eq!(packets, vec![Packet::text("retry")]);
    }

    #[test]
    fn handles_would_block_write_and_flush() {
        let mut writer = MessageWriter::new(FlakyWriter::new(ErrorKind::WouldBlock));
        writer.write_packet(&Packet::binary(vec![6u8])).unwrap();

        let packets = decode_all(writer.into_inner().data);
        assert_eq!(packets, vec![Packet::binary(vec![6u8])]);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.write_frame(b"\x00x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_is_io_error() {
        let mut writer = MessageWriter::new(BrokenWriter);
        let err = writer.write_frame(b"\x00x").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakyWriter {
        kind: ErrorKind,
        wrote_once: bool,
        flushed_once: bool,
        data: Vec<u8>,
    }

    impl FlakyWriter {
        fn new(kind: ErrorKind) -> Self {
            Self {
                kind,
                wrote_once: false,
                flushed_once: false,
                data: Vec::new(),
            }
        }
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(self.kind));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flushed_once {
                self.flushed_once = true;
                return Err(std::io::Error::from(self.kind));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
