use std::{sync::Arc, time::Duration};

use quanta::{Clock, Mock};

/// Monotonic test clock, advanced only by test code and never coupled to
/// wall time. Hand [`clock`] to anything that schedules against a
/// `quanta::Clock` and drive it with [`advance`].
///
/// [`clock`]: VirtualClock::clock
/// [`advance`]: VirtualClock::advance
#[derive(Clone)]
pub struct VirtualClock {
    clock: Clock,
    mock: Arc<Mock>,
}

impl VirtualClock {
    pub fn new() -> Self {
        let (clock, mock) = Clock::mock();
        VirtualClock { clock, mock }
    }

    /// A clock handle reading from this mock.
    pub fn clock(&self) -> Clock {
        self.clock.clone()
    }

    pub fn advance(&self, d: Duration) {
        self.mock.increment(d);
    }

    pub fn now(&self) -> quanta::Instant {
        self.clock.now()
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}
