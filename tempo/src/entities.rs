//! Sample timed entities.
//!
//! These are deliberately tiny. They exist to put load on the scheduler and
//! to show how an entity kind plugs into it: embed a [`TimedObject`], build
//! through [`Arc::new_cyclic`], implement [`Tickable`].
//!
//! Entities that delete themselves report their timer id to a [`Graveyard`]
//! so the owner can release them without scanning everything it holds.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tempo_core::{Category, Tickable, TimedObject, TimerGuard, TimerId, World};
use tempo_utils::locks::SyncMutex;

/// Ids of entities that deleted themselves and wait to be released.
pub type Graveyard = Arc<SyncMutex<Vec<TimerId>>>;

/// A sector heartbeat that fires every `period` milliseconds forever.
pub struct Pulse {
    timer: TimedObject,
    period: i64,
    beats: AtomicU64,
}

impl Pulse {
    /// Creates an unarmed pulse.
    #[must_use]
    pub fn new(world: &World, period: i64) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let owner: Weak<dyn Tickable> = weak.clone();
            Self {
                timer: TimedObject::new(world, Category::Sector, owner),
                period,
                beats: AtomicU64::new(0),
            }
        })
    }

    /// Number of times the pulse fired.
    #[must_use]
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

impl Tickable for Pulse {
    fn timer(&self) -> &TimedObject {
        &self.timer
    }

    fn is_deleted(&self) -> bool {
        false
    }

    fn on_tick(&self, timer: &mut TimerGuard<'_>) -> bool {
        self.beats.fetch_add(1, Ordering::Relaxed);
        timer.set_timeout(self.period);
        true
    }
}

/// A spell effect that fires a fixed number of times and then deletes itself.
pub struct Effect {
    timer: TimedObject,
    /// Tenths of a second between charges.
    interval_tenths: i64,
    charges: AtomicU32,
    deleted: AtomicBool,
    graveyard: Graveyard,
}

impl Effect {
    /// Creates an unarmed effect with `charges` firings left. Its id lands in
    /// `graveyard` once it is gone.
    #[must_use]
    pub fn new(
        world: &World,
        charges: u32,
        interval_tenths: i64,
        graveyard: &Graveyard,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let owner: Weak<dyn Tickable> = weak.clone();
            Self {
                timer: TimedObject::new(world, Category::Item, owner),
                interval_tenths,
                charges: AtomicU32::new(charges),
                deleted: AtomicBool::new(false),
                graveyard: graveyard.clone(),
            }
        })
    }

    /// Charges left.
    #[must_use]
    pub fn charges(&self) -> u32 {
        self.charges.load(Ordering::Relaxed)
    }

    /// Ends the effect early.
    pub fn dispel(&self) {
        self.timer.deregister();
        self.bury(self.timer.id());
    }

    /// Flags the effect deleted and reports it, once.
    fn bury(&self, id: TimerId) {
        if !self.deleted.swap(true, Ordering::AcqRel) {
            self.graveyard.lock().push(id);
        }
    }
}

impl Tickable for Effect {
    fn timer(&self) -> &TimedObject {
        &self.timer
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn on_tick(&self, timer: &mut TimerGuard<'_>) -> bool {
        let left = self.charges.load(Ordering::Relaxed).saturating_sub(1);
        self.charges.store(left, Ordering::Relaxed);

        if left == 0 {
            self.bury(timer.id());
            timer.deregister();
            log::trace!("Effect {} expired", timer.id());
        } else {
            timer.set_timeout_tenths(self.interval_tenths);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::{GameClock, TickDriver};

    fn driver() -> (Arc<GameClock>, TickDriver, Graveyard) {
        let clock = Arc::new(GameClock::new(1));
        let world = World::new(clock.clone());
        (clock, TickDriver::new(world), Graveyard::default())
    }

    #[test]
    fn test_pulse_keeps_beating() {
        let (clock, mut driver, _graveyard) = driver();
        let pulse = Pulse::new(driver.world(), 100);
        pulse.timer().set_timeout(100);

        for _ in 0..20 {
            clock.advance(50);
            driver.run_tick();
        }
        assert_eq!(pulse.beats(), 10);
        assert!(pulse.timer().is_timer_set());
        assert_eq!(driver.stats().category(Category::Sector).ticked, 10);
    }

    #[test]
    fn test_effect_expires() {
        let (clock, mut driver, graveyard) = driver();
        let effect = Effect::new(driver.world(), 3, 2, &graveyard);
        effect.timer().set_timeout_tenths(2);

        for _ in 0..20 {
            clock.advance(100);
            driver.run_tick();
        }
        assert_eq!(effect.charges(), 0);
        assert!(effect.is_deleted());
        assert!(!effect.timer().is_timer_set());
        assert!(driver.world().registry().is_empty());
        assert_eq!(*graveyard.lock(), vec![effect.timer().id()]);

        // Deleted effects cannot be rearmed.
        effect.timer().set_timeout(10);
        assert!(!effect.timer().is_timer_set());
    }

    #[test]
    fn test_dispel_cancels_pending_charge() {
        let (clock, mut driver, graveyard) = driver();
        let effect = Effect::new(driver.world(), 5, 1, &graveyard);
        effect.timer().set_timeout_tenths(1);

        effect.dispel();
        effect.dispel();
        assert_eq!(graveyard.lock().len(), 1);
        clock.advance(1_000);
        assert_eq!(driver.run_tick().due, 0);
        assert_eq!(effect.charges(), 5);
    }
}
