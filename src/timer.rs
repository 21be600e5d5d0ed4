//! A queue of scheduled callbacks, kept sorted by absolute expiry.
//!
//! Each entry remembers the delta it was scheduled with.
//! Comparing the remaining time of an entry against that delta is how
//! a wall clock jumping backwards is detected, see [`TimerQueue::rewind_check`].

use std::{collections::VecDeque, fmt::Display, time::Duration};

use tracing::{debug, trace, warn};

use crate::error::Error;

/// Clocks the queue can run on.
pub mod clock;

use clock::Clock;

/// Milliseconds.
/// Used both for points in time (which wrap around) and for deltas.
pub type Millis = u32;

/// Tolerance added to an entry's delta before its remaining time is seen as
/// evidence of the clock moving backwards.
pub const REWIND_SLACK: Millis = 250;

/// The longest relative delay.
/// Anything longer would wrap around to an expiry in the past.
pub const MAX_DELAY: Millis = i32::MAX as Millis;

/// The callback of a timer.
///
/// Gets the id of the timer that fired and the current time.
/// Returning a non-zero value reschedules the timer that many milliseconds later,
/// returning zero leaves it unscheduled.
pub type TimerCallback = Box<dyn FnMut(TimerId, Millis) -> Millis>;

/// Identifies a timer entry owned by a [`TimerQueue`].
///
/// Stays valid until the entry is freed via [`TimerQueue::free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    index: u32,
    generation: u32,
}

impl Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}.{}", self.index, self.generation)
    }
}

/// How the `millis` argument of [`TimerQueue::set`] is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    /// Expire `millis` from now.
    #[default]
    Relative,

    /// Expire when the clock shows `millis`.
    Absolute,
}

/// Flags for [`TimerQueue::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerFlags {
    /// See [`TimerMode`].
    pub mode: TimerMode,

    /// If the timer was scheduled, run its old callback before rescheduling it.
    pub force_old: bool,
}

impl TimerFlags {
    /// Relative expiry, old callback not forced.
    pub const RELATIVE: Self = Self {
        mode: TimerMode::Relative,
        force_old: false,
    };

    /// Absolute expiry, old callback not forced.
    pub const ABSOLUTE: Self = Self {
        mode: TimerMode::Absolute,
        force_old: false,
    };

    /// Also fire the previously scheduled callback.
    pub fn force_old(mut self) -> Self {
        self.force_old = true;
        self
    }
}

struct TimerEntry {
    expires: Millis,

    /// What the entry was last scheduled with.
    delta: Millis,

    /// Only `None` while the callback runs.
    callback: Option<TimerCallback>,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<TimerEntry>,
}

/// `true` if `expires` is not after `now`.
fn is_due(expires: Millis, now: Millis) -> bool {
    (now.wrapping_sub(expires) as i32) >= 0
}

/// `true` if `a` is strictly after `b`.
fn is_after(a: Millis, b: Millis) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// Scheduled callbacks in ascending order of expiry.
pub struct TimerQueue {
    clock: Box<dyn Clock>,
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    live: usize,

    /// Ids of the scheduled entries, ascending by expiry.
    /// Entries with equal expiry keep the order they were inserted in.
    queue: VecDeque<TimerId>,
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("live", &self.live)
            .field("scheduled", &self.pending().collect::<Vec<_>>())
            .finish()
    }
}

impl TimerQueue {
    /// An empty queue running on the given clock.
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            slots: Vec::new(),
            vacant: Vec::new(),
            live: 0,
            queue: VecDeque::new(),
        }
    }

    /// The time according to the queue's clock.
    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    /// Number of scheduled entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// `true` if the timer is currently in the queue.
    pub fn is_scheduled(&self, timer: TimerId) -> bool {
        self.queue.contains(&timer)
    }

    /// The scheduled entries and their expiry, in firing order.
    pub fn pending(&self) -> impl Iterator<Item = (TimerId, Millis)> + '_ {
        self.queue
            .iter()
            .filter_map(|&id| self.entry(id).ok().map(|entry| (id, entry.expires)))
    }

    /// Expiry of the head of the queue.
    pub fn next_expiry(&self) -> Option<Millis> {
        self.pending().next().map(|(_, expires)| expires)
    }

    /// How long until the head of the queue is due.
    /// `None` if nothing is scheduled, zero if the head is already due.
    pub fn time_until_next(&self, now: Millis) -> Option<Duration> {
        self.next_expiry().map(|expires| {
            let remaining = expires.wrapping_sub(now) as i32;
            Duration::from_millis(remaining.max(0) as u64)
        })
    }

    /// Schedule a callback.
    ///
    /// With `timer` being `None` a new entry is created, otherwise the given
    /// entry is taken out of the queue (and its old callback is run first if
    /// [`TimerFlags::force_old`] is set) before being rescheduled.
    ///
    /// A `millis` of zero leaves the entry unscheduled.
    ///
    /// If the computed expiry is already due the callback runs right away,
    /// before this returns.
    ///
    /// Relative delays above [`MAX_DELAY`] are refused with [`Error::DelayTooLong`],
    /// and so are callbacks asking for one: their entry is left unscheduled.
    pub fn set<F>(
        &mut self,
        timer: Option<TimerId>,
        flags: TimerFlags,
        millis: Millis,
        callback: F,
    ) -> Result<TimerId, Error>
    where
        F: FnMut(TimerId, Millis) -> Millis + 'static,
    {
        if flags.mode == TimerMode::Relative && millis > MAX_DELAY {
            return Err(Error::DelayTooLong(millis));
        }

        let now = self.clock.now();

        let id = match timer {
            None => self.allocate()?,
            Some(id) => {
                self.entry(id)?;

                if self.unlink(id) && flags.force_old {
                    trace!(%id, "Forcing old callback");
                    // Its return value is moot, the callback is replaced below.
                    let _ = self.fire(id, now);
                }

                id
            }
        };

        self.entry_mut(id)?.callback = Some(Box::new(callback));

        if millis == 0 {
            trace!(%id, "Left unscheduled");
            return Ok(id);
        }

        self.schedule(id, flags.mode, millis, now);

        Ok(id)
    }

    /// Take the timer out of the queue and run its callback now.
    pub fn force(&mut self, timer: TimerId) -> Result<(), Error> {
        self.entry(timer)?;

        if !self.unlink(timer) {
            return Err(Error::NotScheduled);
        }

        let now = self.clock.now();
        let next = self.fire(timer, now);
        self.reschedule(timer, next);

        Ok(())
    }

    /// Take the timer out of the queue.
    /// Does nothing if it is not scheduled (or does not exist).
    /// The entry is kept and may be [`set`](Self::set) again.
    pub fn cancel(&mut self, timer: TimerId) {
        if self.unlink(timer) {
            trace!(%timer, "Cancelled");
        }
    }

    /// Cancel the timer and release its storage.
    /// The id must not be used afterwards.
    pub fn free(&mut self, timer: Option<TimerId>) {
        let Some(timer) = timer else {
            return;
        };

        self.cancel(timer);

        let Some(slot) = self.slots.get_mut(timer.index as usize) else {
            return;
        };

        if slot.generation == timer.generation && slot.entry.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.vacant.push(timer.index);
            self.live -= 1;
            trace!(%timer, "Freed");
        }
    }

    /// Fire every entry which is due at `now`, head first.
    pub fn check_expired(&mut self, now: Millis) {
        while let Some(&head) = self.queue.front() {
            let Ok(entry) = self.entry(head) else {
                self.queue.pop_front();
                continue;
            };

            if !is_due(entry.expires, now) {
                break;
            }

            self.queue.pop_front();

            let next = self.fire(head, now);
            self.reschedule(head, next);
        }
    }

    /// Force every entry whose remaining time exceeds its delta by more than
    /// [`REWIND_SLACK`].
    ///
    /// The remaining time is unsigned, so an overdue entry wraps around to a
    /// huge remaining time and is forced as well. Other than that it can only
    /// happen if the clock went backwards.
    pub fn rewind_check(&mut self, now: Millis) {
        // Forcing may reorder the queue, so start over after each one.
        loop {
            let rewound = self.queue.iter().copied().find(|&id| {
                self.entry(id).map_or(false, |entry| {
                    entry.expires.wrapping_sub(now) > entry.delta.wrapping_add(REWIND_SLACK)
                })
            });

            let Some(rewound) = rewound else {
                break;
            };

            match self.entry(rewound) {
                Ok(entry) if is_due(entry.expires, now) => {
                    trace!(timer = %rewound, %now, "Overdue, forcing timer")
                }
                _ => warn!(timer = %rewound, %now, "Clock went backwards, forcing timer"),
            }

            if let Err(e) = self.force(rewound) {
                warn!(?e, "Could not force rewound timer");
                break;
            }
        }
    }

    fn allocate(&mut self) -> Result<TimerId, Error> {
        // A queue position for every live entry, so inserting never reallocates.
        let wanted = (self.live + 1).saturating_sub(self.queue.len());
        self.queue
            .try_reserve(wanted)
            .map_err(|_| Error::AllocationFailure("timer queue"))?;

        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                self.slots
                    .try_reserve(1)
                    .map_err(|_| Error::AllocationFailure("timer entry"))?;
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.entry = Some(TimerEntry {
            expires: 0,
            delta: 0,
            callback: None,
        });
        self.live += 1;

        let id = TimerId {
            index,
            generation: slot.generation,
        };
        trace!(%id, "Allocated");

        Ok(id)
    }

    fn entry(&self, id: TimerId) -> Result<&TimerEntry, Error> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(Error::NoSuchTimer)
    }

    fn entry_mut(&mut self, id: TimerId) -> Result<&mut TimerEntry, Error> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(Error::NoSuchTimer)
    }

    /// Remove from the queue. `true` if it was there.
    fn unlink(&mut self, id: TimerId) -> bool {
        match self.queue.iter().position(|&queued| queued == id) {
            Some(position) => {
                self.queue.remove(position);
                true
            }
            None => false,
        }
    }

    /// Run the callback of an entry which is not in the queue.
    /// Returns what the callback asked for.
    fn fire(&mut self, id: TimerId, now: Millis) -> Millis {
        let Some(mut callback) = self.entry_mut(id).ok().and_then(|entry| entry.callback.take())
        else {
            return 0;
        };

        trace!(%id, %now, "Firing");
        let next = callback(id, now);

        if let Ok(entry) = self.entry_mut(id) {
            entry.callback = Some(callback);
        }

        next
    }

    fn reschedule(&mut self, id: TimerId, next: Millis) {
        if next != 0 {
            let now = self.clock.now();
            self.schedule(id, TimerMode::Relative, next, now);
        }
    }

    /// Compute the expiry and insert, firing right away while already due.
    fn schedule(&mut self, id: TimerId, mut mode: TimerMode, mut millis: Millis, mut now: Millis) {
        loop {
            if mode == TimerMode::Relative && millis > MAX_DELAY {
                warn!(%id, %millis, "Delay too long, leaving timer unscheduled");
                return;
            }

            let (expires, delta) = match mode {
                TimerMode::Relative => (now.wrapping_add(millis), millis),
                TimerMode::Absolute => (millis, millis.wrapping_sub(now)),
            };

            let Ok(entry) = self.entry_mut(id) else {
                return;
            };
            entry.expires = expires;
            entry.delta = delta;

            if !is_due(expires, now) {
                self.insert(id, expires);
                return;
            }

            debug!(%id, %expires, %now, "Already due, firing immediately");
            let next = self.fire(id, now);
            if next == 0 {
                return;
            }

            mode = TimerMode::Relative;
            millis = next;
            now = self.clock.now();
        }
    }

    fn insert(&mut self, id: TimerId, expires: Millis) {
        let position = self
            .queue
            .iter()
            .position(|&queued| {
                self.entry(queued)
                    .map_or(false, |entry| is_after(entry.expires, expires))
            })
            .unwrap_or(self.queue.len());

        trace!(%id, %expires, %position, "Scheduled");
        self.queue.insert(position, id);
    }
}
