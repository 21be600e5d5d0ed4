use std::{
    cell::Cell,
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

use super::Millis;

/// Something which tells the current time in milliseconds.
///
/// The value is allowed to wrap around, and it is allowed to jump backwards.
/// The timer queue copes with both.
pub trait Clock {
    /// The current time.
    fn now(&self) -> Millis;
}

/// The wall clock, truncated to 32 bits of milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since_epoch| since_epoch.as_millis() as Millis)
            .unwrap_or(0)
    }
}

/// A clock which only moves when told to.
///
/// Clones share the same time, so a test can keep one clone
/// while the timer queue owns another.
#[derive(Debug, Default, Clone)]
pub struct ManualClock(Rc<Cell<Millis>>);

impl ManualClock {
    /// A clock showing the given time.
    pub fn new(start: Millis) -> Self {
        Self(Rc::new(Cell::new(start)))
    }

    /// Jump to the given time.
    pub fn set(&self, now: Millis) {
        self.0.set(now);
    }

    /// Move forward.
    pub fn advance(&self, millis: Millis) {
        self.0.set(self.0.get().wrapping_add(millis));
    }

    /// Move backward, as if someone adjusted the wall clock.
    pub fn rewind(&self, millis: Millis) {
        self.0.set(self.0.get().wrapping_sub(millis));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(10);
        let other = clock.clone();

        clock.advance(5);
        assert_eq!(other.now(), 15);

        other.rewind(20);
        assert_eq!(clock.now(), Millis::MAX - 4);
    }

    #[test]
    fn system_clock_moves() {
        let clock = SystemClock;
        let before = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert!(clock.now().wrapping_sub(before) >= 4);
    }
}
