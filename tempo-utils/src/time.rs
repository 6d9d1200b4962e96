//! Simulation time units.
//!
//! World time is an `i64` count of milliseconds. These helpers convert the
//! coarser units game logic likes to think in.

/// Milliseconds in one second.
pub const MSECS_PER_SEC: i64 = 1000;
/// Milliseconds in one tenth of a second.
pub const MSECS_PER_TENTH: i64 = 100;

/// Converts whole seconds to milliseconds, saturating on overflow.
#[inline]
#[must_use]
pub const fn seconds_to_millis(seconds: i64) -> i64 {
    seconds.saturating_mul(MSECS_PER_SEC)
}

/// Converts tenths of a second to milliseconds, saturating on overflow.
#[inline]
#[must_use]
pub const fn tenths_to_millis(tenths: i64) -> i64 {
    tenths.saturating_mul(MSECS_PER_TENTH)
}

/// Length of one simulation tick in milliseconds for the given tick rate.
///
/// Never returns less than one millisecond.
#[must_use]
pub fn millis_per_tick(tick_rate: u32) -> i64 {
    if tick_rate == 0 {
        return MSECS_PER_SEC;
    }
    (MSECS_PER_SEC / i64::from(tick_rate)).max(1)
}
