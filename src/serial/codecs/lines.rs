use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::error::SourceError;

/// Lines longer than this are thrown away if nothing else is configured.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// This codec has a configurable delimiter character for reading.
///
/// Lines longer than the maximum length are discarded,
/// so a device sending garbage without delimiters cannot grow the buffer forever.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a delimiter into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    /// This delimiter is not included in the yielded frames.
    read_delimiter: u8,

    max_length: usize,

    /// Set while skipping the rest of an overlong line.
    discarding: bool,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new(read_delimiter: u8) -> Self {
        Self {
            cursor: 0,
            read_delimiter,
            max_length: DEFAULT_MAX_LINE_LENGTH,
            discarding: false,
        }
    }

    /// Discard lines longer than `max_length` bytes.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b'\n')
    }
}

impl Decoder for LinesCodec {
    type Item = Vec<u8>;
    type Error = SourceError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = src.len();

            // The buffer may have been consumed by someone else since we last looked.
            let cursor = self.cursor.min(read_to);

            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let found = src[cursor..read_to]
                .iter()
                .position(|&byte| byte == self.read_delimiter)
                .map(|position| cursor + position);

            match found {
                Some(position) => {
                    // Next time we need to start over.
                    self.cursor = 0;

                    // Split at the delimiter, getting a slice of the bytes before it.
                    let line = src.split_to(position);

                    // Discard the delimiter by advancing the source buffer beyond it.
                    src.advance(1);

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }

                    if line.len() > self.max_length {
                        warn!(length = line.len(), "Line too long, discarding");
                        continue;
                    }

                    return Ok(Some(line[..].to_vec()));
                }
                None if self.discarding || read_to > self.max_length => {
                    if !self.discarding {
                        warn!(length = read_to, "Line too long, discarding until the next delimiter");
                        self.discarding = true;
                    }

                    src.clear();
                    self.cursor = 0;

                    return Ok(None);
                }
                None => {
                    // We did not find a full frame.
                    // The next time we are called the same buffer `src` will be provided to us,
                    // but possibly with more data.
                    // We don't need to re-read the bytes we have already looked at.
                    self.cursor = read_to;

                    return Ok(None);
                }
            }
        }
    }
}
