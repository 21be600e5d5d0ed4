use std::io;

use thiserror::Error;

/// Errors from the protocol codecs.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// IO related errors.
    #[error("Underlying IO problem")]
    IO(#[from] io::Error),
}
