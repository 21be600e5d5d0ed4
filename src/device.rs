//! The pseudo-terminal the emulator answers on.
//!
//! The master side is what the emulator reads and writes.
//! The slave side is what a client opens, as if it were a serial port.

use std::{
    fs::File,
    io::{self, Read, Write},
    os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd},
};

use nix::{
    fcntl::{self, OFlag},
    pty::{grantpt, posix_openpt, ptsname_r, unlockpt},
    sys::{
        stat::Mode,
        termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg},
    },
};
use tracing::{debug, info};

use crate::error::Error;

/// Sets up a [`PtyDevice`].
#[derive(Debug, Clone)]
pub struct PtyBuilder {
    raw: bool,
}

impl Default for PtyBuilder {
    fn default() -> Self {
        Self { raw: true }
    }
}

fn pty_error(context: &'static str) -> impl FnOnce(nix::Error) -> Error {
    move |source| Error::Pty { context, source }
}

impl PtyBuilder {
    /// A builder with the slave in raw mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether to put the slave in raw mode.
    ///
    /// Without raw mode the line discipline echoes what the emulator writes
    /// back to it, and turns `\r` into `\n` on the way in.
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Allocate the pair.
    pub fn build(self) -> Result<PtyDevice, Error> {
        let master =
            posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(pty_error("open master"))?;
        grantpt(&master).map_err(pty_error("grant slave"))?;
        unlockpt(&master).map_err(pty_error("unlock slave"))?;

        let slave_path = ptsname_r(&master).map_err(pty_error("name slave"))?;

        let slave = fcntl::open(
            slave_path.as_str(),
            OFlag::O_RDWR | OFlag::O_NOCTTY,
            Mode::empty(),
        )
        .map_err(pty_error("open slave"))?;

        // SAFETY: Both descriptors were just opened and are owned by nothing else.
        let (master, slave) = unsafe {
            (
                File::from_raw_fd(master.into_raw_fd()),
                File::from_raw_fd(slave),
            )
        };

        if self.raw {
            let mut termios =
                tcgetattr(slave.as_raw_fd()).map_err(pty_error("get slave attributes"))?;
            cfmakeraw(&mut termios);
            tcsetattr(slave.as_raw_fd(), SetArg::TCSANOW, &termios)
                .map_err(pty_error("set slave attributes"))?;

            debug!(%slave_path, "Slave in raw mode");
        }

        info!(%slave_path, "Pseudo-terminal allocated");

        Ok(PtyDevice {
            master,
            _slave: slave,
            slave_path,
        })
    }
}

/// An allocated pseudo-terminal pair.
///
/// Reads and writes go to the master side.
/// The slave side stays open for as long as this lives,
/// so clients may come and go without the master seeing a hangup.
#[derive(Debug)]
pub struct PtyDevice {
    master: File,
    _slave: File,
    slave_path: String,
}

impl PtyDevice {
    /// Where clients should connect.
    pub fn slave_path(&self) -> &str {
        &self.slave_path
    }
}

impl AsRawFd for PtyDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }
}

impl Read for &PtyDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.master).read(buf)
    }
}

impl Write for &PtyDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&self.master).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.master).flush()
    }
}
