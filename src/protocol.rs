use std::fmt::Display;

/// Protocol related errors.
pub mod error;

/// Codecs for encoding/decoding messages to/from wire.
pub mod codecs;

/// Terminates every line sent to the instrument.
pub const LINE_TERMINATOR: u8 = b'\r';

/// Terminates every line the instrument sends.
pub const REPLY_TERMINATOR: &[u8] = b"\r\n";

/// A command sent to the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `DX`: continuously measure distance.
    DistanceTracking,

    /// `LO`: laser on.
    LaserOn,

    /// `LF`: laser off.
    LaserOff,

    /// Anything else, as received.
    Unknown(Vec<u8>),
}

impl Command {
    /// Interpret a line with its terminator stripped.
    /// Matching is exact and case sensitive.
    pub fn parse(line: &[u8]) -> Self {
        match line {
            b"DX" => Self::DistanceTracking,
            b"LO" => Self::LaserOn,
            b"LF" => Self::LaserOff,
            other => Self::Unknown(other.to_vec()),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::DistanceTracking => write!(f, "DX"),
            Command::LaserOn => write!(f, "LO"),
            Command::LaserOff => write!(f, "LF"),
            Command::Unknown(line) => {
                let line = String::from_utf8_lossy(line);
                write!(f, "unknown: {}", line.chars().take(48).collect::<String>())
            }
        }
    }
}

/// A line the instrument sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledges [`Command::LaserOn`].
    LaserOn,

    /// Acknowledges [`Command::LaserOff`].
    LaserOff,

    /// `E404`: the command is not known.
    NotFound,

    /// A distance reading.
    Reading(String),
}

impl Reply {
    /// The line without terminator.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Reply::LaserOn => b"LO",
            Reply::LaserOff => b"LF",
            Reply::NotFound => b"E404",
            Reply::Reading(value) => value.as_bytes(),
        }
    }
}
