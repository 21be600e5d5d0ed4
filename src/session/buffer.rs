use std::io::{self, Read};

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Bytes received but not yet consumed as complete lines.
///
/// Never holds more than its capacity.
/// Decoding a line keeps whatever follows it at the front,
/// so a partial line is completed by later reads.
#[derive(Debug)]
pub struct LineBuffer {
    bytes: BytesMut,
    capacity: usize,
}

impl LineBuffer {
    /// An empty buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// The most bytes the buffer will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` if nothing more fits.
    #[cfg(test)]
    fn is_full(&self) -> bool {
        self.bytes.len() >= self.capacity
    }

    /// The held bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append as much of `data` as fits, returns how much that was.
    #[cfg(test)]
    fn append(&mut self, data: &[u8]) -> usize {
        let fits = data.len().min(self.capacity - self.bytes.len());
        self.bytes.extend_from_slice(&data[..fits]);

        fits
    }

    /// Do a single read into the free part of the buffer.
    ///
    /// A full buffer reads nothing and returns `Ok(0)`, same as end of stream.
    /// Decoding with a line limit no larger than the capacity keeps it from filling up.
    pub fn read_from<R: Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let start = self.bytes.len();
        self.bytes.resize(self.capacity, 0);

        let result = reader.read(&mut self.bytes[start..]);

        let read = *result.as_ref().unwrap_or(&0);
        self.bytes.truncate(start + read);

        result
    }

    /// Let a decoder consume the next frame from the front of the buffer.
    pub fn decode<D: Decoder>(&mut self, decoder: &mut D) -> Result<Option<D::Item>, D::Error> {
        decoder.decode(&mut self.bytes)
    }
}
