use std::{
    io::{Read, Write},
    os::unix::io::AsRawFd,
    rc::Rc,
};

use tracing::info;

use crate::{
    config::Config,
    device::PtyBuilder,
    error::Error,
    reactor::{poller::Poller, Reactor},
    session::Session,
};

/// Make the reactor answer the instrument protocol on `device`.
///
/// The device is switched to non-blocking mode.
pub fn serve<P, D>(reactor: &mut Reactor<P>, device: Rc<D>, config: &Config) -> Result<(), Error>
where
    P: Poller,
    D: AsRawFd + 'static,
    for<'a> &'a D: Read + Write,
{
    let fd = device.as_raw_fd();
    reactor.register(fd, Session::new(device, config))?;

    info!(%fd, "Serving device");

    Ok(())
}

/// Allocate a pseudo-terminal, print where to connect and serve it.
///
/// Only returns if something went wrong.
pub fn run(config: &Config) -> Result<(), Error> {
    config.validate()?;

    let device = PtyBuilder::new().raw(config.raw_slave).build()?;

    // The one line of output scripts wait for.
    println!("{}", device.slave_path());

    let mut reactor = Reactor::new()?;
    serve(&mut reactor, Rc::new(device), config)?;

    Err(reactor.dispatch())
}
