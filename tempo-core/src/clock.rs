//! Simulation clock.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of world time in milliseconds.
///
/// Time only moves when the server processes ticks, never on its own, and it
/// never goes backwards.
pub trait WorldClock: Send + Sync {
    /// Returns the current world time in milliseconds.
    fn now(&self) -> i64;
}

/// The server's clock, advanced once per processed tick.
#[derive(Debug, Default)]
pub struct GameClock {
    millis: AtomicI64,
}

impl GameClock {
    /// Creates a clock starting at `start` milliseconds.
    #[must_use]
    pub const fn new(start: i64) -> Self {
        Self {
            millis: AtomicI64::new(start),
        }
    }

    /// Moves the clock forward by `millis` and returns the new time.
    ///
    /// Negative steps are ignored.
    pub fn advance(&self, millis: i64) -> i64 {
        let step = millis.max(0);
        self.millis.fetch_add(step, Ordering::AcqRel) + step
    }

    /// Moves the clock to `millis` if that is later than the current time.
    ///
    /// Returns the resulting time.
    pub fn advance_to(&self, millis: i64) -> i64 {
        self.millis.fetch_max(millis, Ordering::AcqRel).max(millis)
    }
}

impl WorldClock for GameClock {
    #[inline]
    fn now(&self) -> i64 {
        self.millis.load(Ordering::Acquire)
    }
}
