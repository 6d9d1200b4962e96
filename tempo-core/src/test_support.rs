//! Entity kinds shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use tempo_utils::locks::SyncMutex;

use crate::{Category, GameClock, Tickable, TimedObject, TimerGuard, World};

pub(crate) type Journal = Arc<SyncMutex<Vec<&'static str>>>;

/// Creates a world around a fresh clock starting at `start`.
pub(crate) fn test_world(start: i64) -> (Arc<GameClock>, World) {
    let clock = Arc::new(GameClock::new(start));
    let world = World::new(clock.clone());
    (clock, world)
}

/// Counts its ticks and optionally reschedules itself.
pub(crate) struct Tracker {
    label: &'static str,
    timer: TimedObject,
    deleted: AtomicBool,
    blocked: AtomicBool,
    failing: AtomicBool,
    /// Milliseconds to spend inside `on_tick`.
    work_ms: AtomicU64,
    ticks: AtomicU32,
    /// Delay to rearm with from `on_tick`, negative for none.
    reschedule: AtomicI64,
    journal: Option<Journal>,
}

impl Tracker {
    pub(crate) fn new(world: &World, label: &'static str) -> Arc<Self> {
        Self::build(world, label, None)
    }

    pub(crate) fn with_journal(world: &World, label: &'static str, journal: &Journal) -> Arc<Self> {
        Self::build(world, label, Some(journal.clone()))
    }

    fn build(world: &World, label: &'static str, journal: Option<Journal>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let owner: Weak<dyn Tickable> = weak.clone();
            Self {
                label,
                timer: TimedObject::new(world, Category::Other, owner),
                deleted: AtomicBool::new(false),
                blocked: AtomicBool::new(false),
                failing: AtomicBool::new(false),
                work_ms: AtomicU64::new(0),
                ticks: AtomicU32::new(0),
                reschedule: AtomicI64::new(-1),
                journal,
            }
        })
    }

    pub(crate) fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }

    pub(crate) fn set_reschedule(&self, delay: i64) {
        self.reschedule.store(delay, Ordering::Release);
    }

    pub(crate) fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Release);
    }

    /// Makes `on_tick` report failure after spending `work_ms` in it.
    pub(crate) fn set_failing(&self, work_ms: u64) {
        self.failing.store(true, Ordering::Release);
        self.work_ms.store(work_ms, Ordering::Release);
    }

    /// Flags the entity deleted without touching its timer.
    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// The full delete path: flag, then drop the registration.
    pub(crate) fn delete(&self) {
        self.mark_deleted();
        self.timer.deregister();
    }
}

impl Tickable for Tracker {
    fn timer(&self) -> &TimedObject {
        &self.timer
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn can_tick(&self, timer: &TimerGuard<'_>) -> bool {
        !timer.is_sleeping() && !self.blocked.load(Ordering::Acquire)
    }

    fn on_tick(&self, timer: &mut TimerGuard<'_>) -> bool {
        self.ticks.fetch_add(1, Ordering::AcqRel);
        if let Some(journal) = &self.journal {
            journal.lock().push(self.label);
        }
        let work = self.work_ms.load(Ordering::Acquire);
        if work > 0 {
            thread::sleep(Duration::from_millis(work));
        }
        let delay = self.reschedule.load(Ordering::Acquire);
        if delay >= 0 {
            timer.set_timeout(delay);
        }
        !self.failing.load(Ordering::Acquire)
    }
}
