//! Newline-delimited line codec
//!
//! Wraps `LinesCodec` with the chat protocol's framing rules:
//! decoded lines are whitespace-trimmed, and bytes left without a
//! terminating newline when the peer closes are discarded instead of
//! surfacing as a final line.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Default maximum line length in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Line codec for both directions of a chat connection
#[derive(Debug, Clone)]
pub struct LineCodec {
    inner: LinesCodec,
}

impl LineCodec {
    /// Create a codec rejecting lines longer than `max_length` bytes
    pub fn new(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        Ok(self
            .inner
            .decode(buf)?
            .map(|line| line.trim().to_string()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LinesCodecError> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None => {
                // Unterminated trailing bytes are end-of-stream, not a line.
                buf.clear();
                Ok(None)
            }
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: T, buf: &mut BytesMut) -> Result<(), LinesCodecError> {
        self.inner.encode(line, buf)
    }
}
