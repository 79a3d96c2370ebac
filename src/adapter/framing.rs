//! Newline framing of the agent's stdout

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// One framed stdout item
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A complete line without its terminator
    Line(String),
    /// A line longer than the limit; its bytes were discarded
    Oversized,
    /// A line that was not UTF-8
    NotUtf8,
}

/// [`LinesCodec`] that reports bad lines as items instead of stream errors
///
/// `FramedRead` ends the stream after any decoder error, so recoverable
/// per-line problems must not surface as one.
pub(crate) struct RecordCodec {
    lines: LinesCodec,
}

impl RecordCodec {
    pub(crate) fn new(max_line_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_bytes),
        }
    }

    fn map(result: Result<Option<String>, LinesCodecError>) -> Result<Option<Frame>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Oversized)),
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(Frame::NotUtf8))
            }
            Err(e) => Err(e),
        }
    }
}

impl Decoder for RecordCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::map(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::map(self.lines.decode_eof(buf))
    }
}
