use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::protocol::{error::ProtocolError, Reply, LINE_TERMINATOR, REPLY_TERMINATOR};

/// What the [`LinesCodec`] yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator stripped. Never empty.
    Line(Vec<u8>),

    /// A line which grew past the maximum length.
    /// Its bytes were dropped, this is yielded once its terminator arrived.
    Overlong,
}

/// Splits incoming bytes at carriage returns and writes replies with `\r\n` appended.
///
/// Carriage returns and line feeds at the start of a line are skipped,
/// so blank lines and the `\n` of a `\r\n` pair never show up as frames.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a terminator into the buffer
    cursor: usize,

    /// Longest line kept while waiting for its terminator.
    max_length: usize,

    /// Dropping bytes until the next terminator.
    discarding: bool,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new(max_length: usize) -> Self {
        Self {
            cursor: 0,
            max_length,
            discarding: false,
        }
    }

    /// `true` while the rest of an overlong line is being dropped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(8192)
    }
}

fn is_blank(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

impl Decoder for LinesCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.discarding {
            return match src.iter().position(|&byte| byte == LINE_TERMINATOR) {
                Some(position) => {
                    src.advance(position + 1);
                    self.discarding = false;

                    Ok(Some(Frame::Overlong))
                }
                None => {
                    src.clear();
                    Ok(None)
                }
            };
        }

        if self.cursor == 0 {
            let blanks = src.iter().take_while(|&&byte| is_blank(byte)).count();
            src.advance(blanks);
        }

        let read_to = src.len();
        let look_at = &src[self.cursor..read_to];

        if let Some(position) = look_at.iter().position(|&byte| byte == LINE_TERMINATOR) {
            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we need to start over.
            self.cursor = 0;

            let line = src.split_to(actual_position);

            // Discard the terminator.
            src.advance(1);

            return Ok(Some(Frame::Line(line.to_vec())));
        }

        if read_to >= self.max_length {
            warn!(
                length = %read_to,
                max = %self.max_length,
                "Line too long, dropping it"
            );

            src.clear();
            self.cursor = 0;
            self.discarding = true;

            return Ok(None);
        }

        // The bytes looked at so far have no terminator, no need to look at them again.
        self.cursor = read_to;

        Ok(None)
    }
}

impl Encoder<Reply> for LinesCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.as_bytes().len() + REPLY_TERMINATOR.len());
        dst.extend_from_slice(item.as_bytes());
        dst.extend_from_slice(REPLY_TERMINATOR);

        Ok(())
    }
}
