use std::{io, os::unix::io::RawFd};

use thiserror::Error;

/// Errors thay may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Every handle slot of the registry is taken.
    #[error("All {0} handle slots are in use")]
    CapacityExceeded(usize),

    /// The handle could not be switched to non-blocking mode.
    #[error("Could not switch handle {fd} to non-blocking mode")]
    ModeChange {
        /// The problematic handle.
        fd: RawFd,

        /// What the OS said.
        #[source]
        source: nix::Error,
    },

    /// Storage for a registration or a timer entry could not be reserved.
    #[error("Could not allocate storage for {0}")]
    AllocationFailure(&'static str),

    /// The handle is registered already.
    #[error("The handle `{0}` is already registered")]
    AlreadyRegistered(RawFd),

    /// The handle is not registered.
    #[error("The handle `{0}` is not registered")]
    NotFound(RawFd),

    /// The timer id does not refer to a live timer entry.
    /// Happens when using an id after freeing it.
    #[error("The timer does not exist (freed or never created)")]
    NoSuchTimer,

    /// A relative delay so long it would wrap around into the past.
    #[error("A delay of {0}ms is too long")]
    DelayTooLong(u32),

    /// The timer exists but is not in the queue.
    #[error("The timer is not scheduled")]
    NotScheduled,

    /// Reading from a handle failed with something else than "no data right now".
    #[error("Reading from handle failed")]
    ReadFailure(#[source] io::Error),

    /// The readiness wait failed.
    /// This stops the reactor.
    #[error("Waiting for readiness failed")]
    Multiplex(#[source] io::Error),

    /// Adding or removing a handle from the readiness poller failed.
    #[error("Poller registration failed")]
    Poller(#[source] io::Error),

    /// Setting up the pseudo-terminal failed.
    #[error("Pseudo-terminal setup failed: {context}")]
    Pty {
        /// Which step failed.
        context: &'static str,

        /// What the OS said.
        #[source]
        source: nix::Error,
    },

    /// The client could not open the device.
    #[error("Could not open `{path}`")]
    OpenDevice {
        /// The device path given.
        path: String,

        /// What the serial layer said.
        #[source]
        source: tokio_serial::Error,
    },

    /// The client lost the connection to the device.
    #[error("Talking to the device failed")]
    Client(#[source] io::Error),

    /// The configuration is not valid.
    #[error("The configuration is not valid. Problem: `{0}`")]
    BadConfig(String),
}

impl Error {
    /// If the error is [`Error::BadConfig`], get the problem description.
    pub fn try_into_bad_config(self) -> Option<String> {
        if let Self::BadConfig(problem) = self {
            Some(problem)
        } else {
            None
        }
    }
}
