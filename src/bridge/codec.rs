//! Line framing for agent stdout.
//!
//! [`LineCodec`] is a [`Decoder`] used with
//! [`FramedRead`](tokio_util::codec::FramedRead) over the child's stdout. It
//! holds one pending partial-line buffer, so lines split across I/O chunks
//! (including in the middle of a multi-byte character) are emitted exactly
//! once, whole, in arrival order. A trailing unterminated line is emitted at
//! end of stream.
//!
//! The decoder state (`next_index`, `discarding`, `max_length`) follows
//! [`tokio_util::codec::LinesCodec`]. It differs in two ways: invalid UTF-8
//! never fails the stream (bytes are decoded lossily and the normalizer drops
//! whatever does not parse), and an over-long line is skipped rather than
//! returned as an error, since [`FramedRead`](tokio_util::codec::FramedRead)
//! stops after the first decoder error.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use agent_bridge::bridge::codec::LineCodec;
//!
//! let lines = FramedRead::new(child_stdout, LineCodec::new());
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::{AppError, Result};

/// Maximum line length accepted by [`LineCodec::new`]: 16 MiB.
///
/// Agents embed whole tool results (file contents, command output) in a
/// single line, so the limit is generous; it exists only to bound memory
/// when an agent writes an unterminated stream.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Newline framing with lossy UTF-8 decoding and a line-length guard.
///
/// # Decoder
///
/// Returns each line without its `\n` (and without a preceding `\r`). Empty
/// lines are returned as empty strings. A line longer than the limit is
/// dropped with a warning and decoding resumes after the next newline; it is
/// not reported as an error, because [`FramedRead`] ends the stream after
/// any decoder error.
///
/// The only errors are I/O errors from the underlying reader, surfaced as
/// [`AppError::Io`].
///
/// [`FramedRead`]: tokio_util::codec::FramedRead
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes of the buffer already scanned for a newline.
    next_index: usize,
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line-length limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    /// Configured line-length limit.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let read_to = src.len().min(self.max_length.saturating_add(1));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            match (self.discarding, newline) {
                (true, Some(idx)) => {
                    src.advance(idx + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(idx)) => {
                    self.next_index = 0;
                    let line = src.split_to(idx + 1);
                    return Ok(Some(to_line(&line[..idx])));
                }
                (false, None) if src.len() > self.max_length => {
                    warn!(
                        max_length = self.max_length,
                        "line codec: line too long, discarding until next newline"
                    );
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if self.discarding || src.is_empty() {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }

        let rest = src.split_to(src.len());
        Ok(Some(to_line(&rest)))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
