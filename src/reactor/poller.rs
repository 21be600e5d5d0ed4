use std::{io, os::unix::io::RawFd, time::Duration};

use mio::{unix::SourceFd, Events, Interest, Poll, Token};

/// The handles which became readable during a wait.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadySet(Vec<Token>);

impl ReadySet {
    /// Forget all readiness.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Mark a token as ready.
    pub fn insert(&mut self, token: Token) {
        if !self.0.contains(&token) {
            self.0.push(token);
        }
    }

    /// `true` if the token is ready.
    pub fn contains(&self, token: Token) -> bool {
        self.0.contains(&token)
    }

    /// `true` if nothing is ready.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// How many tokens are ready.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Token> for ReadySet {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        let mut set = Self::default();
        iter.into_iter().for_each(|token| set.insert(token));
        set
    }
}

/// Waits for handles to become readable.
///
/// There is exactly one blocking call: [`Poller::wait`].
pub trait Poller {
    /// Start watching `fd` for readability, reporting it as `token`.
    fn add(&mut self, fd: RawFd, token: Token) -> io::Result<()>;

    /// Stop watching `fd`.
    fn remove(&mut self, fd: RawFd) -> io::Result<()>;

    /// Block until at least one watched handle is readable or the timeout passes.
    /// `None` waits forever.
    ///
    /// On return `ready` holds exactly the tokens that became readable.
    fn wait(&mut self, ready: &mut ReadySet, timeout: Option<Duration>) -> io::Result<()>;
}

/// A [`Poller`] on top of [`mio::Poll`].
///
/// Readiness is edge triggered, so whoever gets told about a readable handle
/// has to drain it until it would block.
#[derive(Debug)]
pub struct MioPoller {
    poll: Poll,
    events: Events,
}

impl MioPoller {
    /// Create the OS poll instance.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(64),
        })
    }
}

impl Poller for MioPoller {
    fn add(&mut self, fd: RawFd, token: Token) -> io::Result<()> {
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token, Interest::READABLE)
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    fn wait(&mut self, ready: &mut ReadySet, timeout: Option<Duration>) -> io::Result<()> {
        ready.clear();

        self.poll.poll(&mut self.events, timeout)?;

        for event in self.events.iter() {
            ready.insert(event.token());
        }

        Ok(())
    }
}

/// A poller which replays a script instead of asking the OS.
#[cfg(test)]
pub(crate) mod scripted {
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    use super::*;
    use crate::timer::{clock::ManualClock, Millis};

    /// What a single wait does.
    pub(crate) enum Step {
        /// Let time pass, then report these tokens as ready.
        Ready { advance: Millis, tokens: Vec<Token> },

        /// Fail with this kind of error.
        Fail(io::ErrorKind),
    }

    #[derive(Debug, Default)]
    pub(crate) struct Record {
        pub(crate) added: Vec<(RawFd, Token)>,
        pub(crate) removed: Vec<RawFd>,
        pub(crate) timeouts: Vec<Option<Duration>>,
    }

    pub(crate) struct ScriptedPoller {
        clock: ManualClock,
        script: VecDeque<Step>,
        pub(crate) record: Rc<RefCell<Record>>,
    }

    impl ScriptedPoller {
        pub(crate) fn new(clock: ManualClock, script: impl IntoIterator<Item = Step>) -> Self {
            Self {
                clock,
                script: script.into_iter().collect(),
                record: Rc::default(),
            }
        }
    }

    impl Poller for ScriptedPoller {
        fn add(&mut self, fd: RawFd, token: Token) -> io::Result<()> {
            self.record.borrow_mut().added.push((fd, token));
            Ok(())
        }

        fn remove(&mut self, fd: RawFd) -> io::Result<()> {
            self.record.borrow_mut().removed.push(fd);
            Ok(())
        }

        fn wait(&mut self, ready: &mut ReadySet, timeout: Option<Duration>) -> io::Result<()> {
            ready.clear();
            self.record.borrow_mut().timeouts.push(timeout);

            match self.script.pop_front() {
                Some(Step::Ready { advance, tokens }) => {
                    self.clock.advance(advance);
                    tokens.into_iter().for_each(|token| ready.insert(token));
                    Ok(())
                }
                Some(Step::Fail(kind)) => Err(kind.into()),
                None => Err(io::Error::new(io::ErrorKind::Other, "script exhausted")),
            }
        }
    }
}
