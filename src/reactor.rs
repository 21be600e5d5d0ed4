//! The single threaded dispatch loop.
//!
//! Each iteration waits for any registered handle to become readable,
//! but never longer than until the nearest timer expires.
//! Then ready handles get their handlers called and due timers fire.
//! Nothing runs concurrently: handlers and timer callbacks run to completion one at a time.

use std::{
    io,
    os::unix::io::RawFd,
    time::{Duration, Instant},
};

use tracing::{debug, error, info, trace};

use crate::{
    error::Error,
    timer::{
        clock::{Clock, SystemClock},
        TimerQueue,
    },
};

/// Waiting for readiness.
pub mod poller;

/// The table of watched handles.
pub mod registry;

use poller::{MioPoller, Poller, ReadySet};
use registry::{HandleRegistry, ReadHandler};

/// Whether the reactor still dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Dispatching.
    Running,

    /// The readiness wait failed, nothing more will happen.
    Stopped,
}

/// Handles plus timers, driven by one loop.
pub struct Reactor<P = MioPoller> {
    handles: HandleRegistry<P>,
    timers: TimerQueue,
    ready: ReadySet,
    state: State,
}

impl Reactor<MioPoller> {
    /// A reactor on the OS poller and the wall clock.
    pub fn new() -> Result<Self, Error> {
        Self::with_clock(SystemClock)
    }

    /// A reactor on the OS poller and the given clock.
    pub fn with_clock(clock: impl Clock + 'static) -> Result<Self, Error> {
        let poller = MioPoller::new().map_err(Error::Poller)?;

        Ok(Self::with_poller(poller, clock))
    }
}

impl<P: Poller> Reactor<P> {
    /// A reactor on any poller and clock.
    pub fn with_poller(poller: P, clock: impl Clock + 'static) -> Self {
        Self {
            handles: HandleRegistry::new(poller),
            timers: TimerQueue::new(clock),
            ready: ReadySet::default(),
            state: State::Running,
        }
    }

    /// See [`HandleRegistry::register`].
    pub fn register<H>(&mut self, fd: RawFd, handler: H) -> Result<(), Error>
    where
        H: ReadHandler + 'static,
    {
        self.handles.register(fd, handler)
    }

    /// See [`HandleRegistry::deregister`].
    pub fn deregister(&mut self, fd: RawFd) -> Result<Box<dyn ReadHandler>, Error> {
        self.handles.deregister(fd)
    }

    /// The registered handles.
    pub fn handles(&self) -> &HandleRegistry<P> {
        &self.handles
    }

    /// The timer queue, for scheduling outside of handlers.
    pub fn timers(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }

    /// See [`State`].
    pub fn state(&self) -> State {
        self.state
    }

    /// Run a single iteration.
    ///
    /// `limit` caps the wait in addition to the nearest timer.
    /// Only a failed wait is an error, and it stops the reactor.
    pub fn turn(&mut self, limit: Option<Duration>) -> Result<(), Error> {
        // Also fires whatever became due since the last turn.
        if !self.timers.is_empty() {
            let now = self.timers.now();
            self.timers.rewind_check(now);
        }

        let timeout = match (self.timers.time_until_next(self.timers.now()), limit) {
            (Some(budget), Some(limit)) => Some(budget.min(limit)),
            (budget, limit) => budget.or(limit),
        };
        trace!(?timeout, "Waiting");

        match self.handles.wait(&mut self.ready, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                debug!("Wait interrupted, retrying");
                return Ok(());
            }
            Err(e) => {
                error!(?e, "Readiness wait failed, stopping");
                self.state = State::Stopped;
                return Err(Error::Multiplex(e));
            }
        }

        if !self.ready.is_empty() {
            self.handles.dispatch_ready(&self.ready, &mut self.timers);
        }

        // Handlers take time too, which may have made more timers due.
        let now = self.timers.now();
        self.timers.check_expired(now);

        Ok(())
    }

    /// Dispatch until `duration` has passed.
    pub fn run_for(&mut self, duration: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + duration;

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }

            self.turn(Some(left))?;
        }
    }

    /// Dispatch until the readiness wait fails.
    /// This is the only way out, and the reason is returned.
    pub fn dispatch(&mut self) -> Error {
        info!(handles = %self.handles.len(), "Dispatching");

        loop {
            if let Err(e) = self.turn(None) {
                return e;
            }
        }
    }
}
