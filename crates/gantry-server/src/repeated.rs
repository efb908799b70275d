use std::time::Duration;

use quanta::{Clock, Instant};
use tracing::trace;

/// Identifies one repeated callback for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

struct Entry {
    id: CallbackId,
    interval: Duration,
    next_due: Instant,
    callback: Box<dyn FnMut()>,
}

/// Drives registered callbacks on fixed intervals from the main loop.
///
/// `run_due` fires each due callback at most once per call and advances
/// its deadline by whole intervals, so a slow iteration neither
/// accumulates drift nor replays every missed tick.
pub struct CallbackScheduler {
    clock: Clock,
    entries: Vec<Entry>,
    next_id: u64,
}

impl CallbackScheduler {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Tests hand in a mocked clock here.
    pub fn with_clock(clock: Clock) -> Self {
        CallbackScheduler { clock, entries: Vec::new(), next_id: 0 }
    }

    pub fn add_repeated_callback(
        &mut self,
        interval: Duration,
        callback: Box<dyn FnMut()>,
    ) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        let next_due = self.clock.now() + interval;
        self.entries.push(Entry { id, interval, next_due, callback });
        trace!(id = id.0, ?interval, "added repeated callback");
        id
    }

    /// Returns whether the id was registered.
    pub fn remove_repeated_callback(&mut self, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    /// Runs every callback that has come due, in registration order.
    pub fn run_due(&mut self) {
        let now = self.clock.now();
        for entry in &mut self.entries {
            if entry.next_due > now {
                continue;
            }
            (entry.callback)();
            while entry.next_due <= now {
                entry.next_due += entry.interval;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CallbackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use gantry_testing::VirtualClock;

    use super::*;

    #[test]
    fn fires_on_interval_under_a_mock_clock() {
        let clock = VirtualClock::new();
        let mut scheduler = CallbackScheduler::with_clock(clock.clock());
        let fired = Rc::new(Cell::new(0u32));

        let count = Rc::clone(&fired);
        scheduler.add_repeated_callback(
            Duration::from_secs(2),
            Box::new(move || count.set(count.get() + 1)),
        );

        scheduler.run_due();
        assert_eq!(fired.get(), 0);

        clock.advance(Duration::from_secs(2));
        scheduler.run_due();
        assert_eq!(fired.get(), 1);

        // not due again until another interval passes
        scheduler.run_due();
        assert_eq!(fired.get(), 1);

        clock.advance(Duration::from_secs(2));
        scheduler.run_due();
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn missed_ticks_collapse_into_one_fire() {
        let clock = VirtualClock::new();
        let mut scheduler = CallbackScheduler::with_clock(clock.clock());
        let fired = Rc::new(Cell::new(0u32));

        let count = Rc::clone(&fired);
        scheduler.add_repeated_callback(
            Duration::from_millis(10),
            Box::new(move || count.set(count.get() + 1)),
        );

        clock.advance(Duration::from_millis(95));
        scheduler.run_due();
        assert_eq!(fired.get(), 1);

        // the deadline moved past `now`, not just one interval forward
        clock.advance(Duration::from_millis(10));
        scheduler.run_due();
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn removed_callbacks_stop_firing() {
        let clock = VirtualClock::new();
        let mut scheduler = CallbackScheduler::with_clock(clock.clock());
        let fired = Rc::new(Cell::new(0u32));

        let count = Rc::clone(&fired);
        let id = scheduler.add_repeated_callback(
            Duration::from_secs(1),
            Box::new(move || count.set(count.get() + 1)),
        );

        assert!(scheduler.remove_repeated_callback(id));
        assert!(!scheduler.remove_repeated_callback(id));

        clock.advance(Duration::from_secs(5));
        scheduler.run_due();
        assert_eq!(fired.get(), 0);
        assert!(scheduler.is_empty());
    }
}
