use std::{io, os::unix::io::RawFd, time::Duration};

use mio::Token;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::{debug, info, warn};

use super::poller::{Poller, ReadySet};
use crate::{error::Error, timer::TimerQueue};

/// How many handles may be registered at the same time.
pub const CAPACITY: usize = 8;

/// Something to call when a handle becomes readable.
///
/// Readiness is only reported on changes, so the handler must read until
/// the handle reports that nothing more is available.
/// It must never block.
pub trait ReadHandler {
    /// The handle `fd` is readable.
    /// Timers may be scheduled or cancelled via `timers`.
    fn on_readable(&mut self, fd: RawFd, timers: &mut TimerQueue);
}

impl<F> ReadHandler for F
where
    F: FnMut(RawFd, &mut TimerQueue),
{
    fn on_readable(&mut self, fd: RawFd, timers: &mut TimerQueue) {
        self(fd, timers)
    }
}

struct Registration {
    fd: RawFd,
    handler: Box<dyn ReadHandler>,
}

fn set_nonblocking(fd: RawFd) -> Result<(), Error> {
    let mode_change = |source| Error::ModeChange { fd, source };

    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(mode_change)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(mode_change)?;

    Ok(())
}

/// A fixed number of slots, each holding a handle and its [`ReadHandler`].
///
/// The slot index doubles as the poller token,
/// so handlers are always called in slot order.
pub struct HandleRegistry<P> {
    poller: P,
    slots: [Option<Registration>; CAPACITY],
    live: usize,
}

impl<P: Poller> HandleRegistry<P> {
    /// An empty registry watching handles through `poller`.
    pub fn new(poller: P) -> Self {
        Self {
            poller,
            slots: Default::default(),
            live: 0,
        }
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.live
    }

    /// `true` if no handle is registered.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// `true` if the handle is registered.
    pub fn contains(&self, fd: RawFd) -> bool {
        self.slot_of(fd).is_some()
    }

    /// Put the handle in non-blocking mode and start watching it.
    pub fn register<H>(&mut self, fd: RawFd, handler: H) -> Result<(), Error>
    where
        H: ReadHandler + 'static,
    {
        if self.contains(fd) {
            return Err(Error::AlreadyRegistered(fd));
        }

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::CapacityExceeded(CAPACITY))?;

        set_nonblocking(fd)?;

        self.poller.add(fd, Token(slot)).map_err(Error::Poller)?;

        self.slots[slot] = Some(Registration {
            fd,
            handler: Box::new(handler),
        });
        self.live += 1;

        info!(%fd, %slot, live = %self.live, "Registered handle");

        Ok(())
    }

    /// Stop watching the handle and hand back its handler.
    pub fn deregister(&mut self, fd: RawFd) -> Result<Box<dyn ReadHandler>, Error> {
        let slot = self.slot_of(fd).ok_or(Error::NotFound(fd))?;

        let Some(registration) = self.slots[slot].take() else {
            return Err(Error::NotFound(fd));
        };
        self.live -= 1;

        // A closed handle has already left the poller on its own.
        if let Err(e) = self.poller.remove(fd) {
            warn!(?e, %fd, "Could not remove handle from poller");
        }

        info!(%fd, %slot, live = %self.live, "Deregistered handle");

        Ok(registration.handler)
    }

    /// Wait for readiness of any registered handle.
    pub fn wait(&mut self, ready: &mut ReadySet, timeout: Option<Duration>) -> io::Result<()> {
        self.poller.wait(ready, timeout)
    }

    /// Call the handler of every registered handle in `ready`, in slot order.
    pub fn dispatch_ready(&mut self, ready: &ReadySet, timers: &mut TimerQueue) {
        for (slot, registration) in self.slots.iter_mut().enumerate() {
            let Some(registration) = registration else {
                continue;
            };

            if ready.contains(Token(slot)) {
                debug!(fd = %registration.fd, %slot, "Readable");
                registration
                    .handler
                    .on_readable(registration.fd, timers);
            }
        }
    }

    fn slot_of(&self, fd: RawFd) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .map_or(false, |registration| registration.fd == fd)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        os::unix::{io::AsRawFd, net::UnixStream},
        rc::Rc,
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        reactor::poller::scripted::ScriptedPoller,
        timer::clock::ManualClock,
    };

    fn registry() -> HandleRegistry<ScriptedPoller> {
        HandleRegistry::new(ScriptedPoller::new(ManualClock::default(), []))
    }

    fn timers() -> TimerQueue {
        TimerQueue::new(ManualClock::default())
    }

    /// Keeps both ends alive, the first one is what gets registered.
    fn pairs(n: usize) -> Vec<(UnixStream, UnixStream)> {
        (0..n).map(|_| UnixStream::pair().unwrap()).collect()
    }

    fn noop(_: RawFd, _: &mut TimerQueue) {}

    #[test]
    fn capacity_is_enforced() {
        let mut registry = registry();
        let handles = pairs(CAPACITY + 1);

        for (ours, _) in &handles[..CAPACITY] {
            registry.register(ours.as_raw_fd(), noop).unwrap();
        }
        assert_eq!(registry.len(), CAPACITY);

        let extra = handles[CAPACITY].0.as_raw_fd();
        let err = registry.register(extra, noop).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(CAPACITY)));

        assert_eq!(registry.len(), CAPACITY);
        for (ours, _) in &handles[..CAPACITY] {
            assert!(registry.contains(ours.as_raw_fd()));
        }
        assert!(!registry.contains(extra));
    }

    #[test]
    fn register_sets_nonblocking_and_watches() {
        let mut registry = registry();
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let fd = ours.as_raw_fd();

        registry.register(fd, noop).unwrap();

        let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL).unwrap());
        assert!(flags.contains(OFlag::O_NONBLOCK));
        assert_eq!(registry.poller.record.borrow().added, vec![(fd, Token(0))]);
    }

    #[test]
    fn register_twice_is_bad() {
        let mut registry = registry();
        let (ours, _theirs) = UnixStream::pair().unwrap();

        registry.register(ours.as_raw_fd(), noop).unwrap();
        let err = registry.register(ours.as_raw_fd(), noop).unwrap_err();

        assert!(matches!(err, Error::AlreadyRegistered(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_bad_handle_is_mode_change_error() {
        let mut registry = registry();

        let err = registry.register(-1, noop).unwrap_err();

        assert!(matches!(err, Error::ModeChange { fd: -1, .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn deregister_frees_the_slot() {
        let mut registry = registry();
        let handles = pairs(CAPACITY + 1);

        for (ours, _) in &handles[..CAPACITY] {
            registry.register(ours.as_raw_fd(), noop).unwrap();
        }

        let gone = handles[3].0.as_raw_fd();
        registry.deregister(gone).unwrap();
        assert_eq!(registry.len(), CAPACITY - 1);
        assert_eq!(registry.poller.record.borrow().removed, vec![gone]);

        // The freed slot is reused.
        let extra = handles[CAPACITY].0.as_raw_fd();
        registry.register(extra, noop).unwrap();
        assert_eq!(
            registry.poller.record.borrow().added.last(),
            Some(&(extra, Token(3)))
        );
    }

    #[test]
    fn deregister_unknown_is_not_found() {
        let mut registry = registry();

        let err = registry.deregister(42).err().unwrap();
        assert!(matches!(err, Error::NotFound(42)));
    }

    #[test]
    fn deregister_returns_the_handler() {
        let mut registry = registry();
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let fd = ours.as_raw_fd();

        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        registry
            .register(fd, move |_: RawFd, _: &mut TimerQueue| *counter.borrow_mut() += 1)
            .unwrap();

        let mut handler = registry.deregister(fd).unwrap();
        handler.on_readable(fd, &mut timers());

        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn dispatch_follows_slot_order_not_readiness_order() {
        let mut registry = registry();
        let handles = pairs(4);
        let calls = Rc::new(RefCell::new(vec![]));

        for (ours, _) in &handles {
            let calls = calls.clone();
            registry
                .register(ours.as_raw_fd(), move |fd: RawFd, _: &mut TimerQueue| {
                    calls.borrow_mut().push(fd)
                })
                .unwrap();
        }

        let ready: ReadySet = [Token(3), Token(0), Token(2)].into_iter().collect();
        registry.dispatch_ready(&ready, &mut timers());

        let fd = |i: usize| handles[i].0.as_raw_fd();
        assert_eq!(*calls.borrow(), vec![fd(0), fd(2), fd(3)]);
    }

    #[test]
    fn dispatch_skips_vacant_slots() {
        let mut registry = registry();
        let handles = pairs(2);
        let calls = Rc::new(RefCell::new(vec![]));

        for (ours, _) in &handles {
            let calls = calls.clone();
            registry
                .register(ours.as_raw_fd(), move |fd: RawFd, _: &mut TimerQueue| {
                    calls.borrow_mut().push(fd)
                })
                .unwrap();
        }
        registry.deregister(handles[0].0.as_raw_fd()).unwrap();

        let ready: ReadySet = [Token(0), Token(1), Token(5)].into_iter().collect();
        registry.dispatch_ready(&ready, &mut timers());

        assert_eq!(*calls.borrow(), vec![handles[1].0.as_raw_fd()]);
    }
}
