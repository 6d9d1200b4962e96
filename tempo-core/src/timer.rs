//! Per-entity timer state.
//!
//! A [`TimedObject`] holds at most one pending wakeup for the entity that
//! embeds it. Public methods on [`TimedObject`] take the timer's lock
//! themselves; [`TimerGuard`] exposes the same operations on an already locked
//! timer and is what tick callbacks receive.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tempo_utils::locks::{SyncRwLock, SyncRwLockWriteGuard};
use tempo_utils::time::{MSECS_PER_SEC, MSECS_PER_TENTH, seconds_to_millis, tenths_to_millis};

use crate::registry::{TickKey, TickRegistry};
use crate::{World, WorldClock};

/// What kind of object a timer belongs to.
///
/// Only used to group tick statistics. It never changes when or whether an
/// entity ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    /// Player characters and NPCs.
    Character = 0,
    /// Loose and equipped items, including spell effects.
    Item = 1,
    /// Containers and their contents bookkeeping.
    Container = 2,
    /// Multi-tile structures such as houses.
    Multi = 3,
    /// Ships.
    Ship = 4,
    /// Map sectors (weather, light, respawns).
    Sector = 5,
    /// Anything else.
    #[default]
    Other = 6,
}

impl Category {
    /// Number of categories.
    pub const COUNT: usize = 7;

    /// Every category, in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Character,
        Self::Item,
        Self::Container,
        Self::Multi,
        Self::Ship,
        Self::Sector,
        Self::Other,
    ];

    /// Dense index of this category, usable for array lookups.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lowercase name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Item => "item",
            Self::Container => "container",
            Self::Multi => "multi",
            Self::Ship => "ship",
            Self::Sector => "sector",
            Self::Other => "other",
        }
    }
}

/// Identifies one timer within a [`TickRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub(crate) u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The persistent part of a timer.
///
/// `deadline` is absolute world time, so restoring a snapshot after the clock
/// moved on keeps the original due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Absolute deadline in milliseconds, `0` when no timer is armed.
    pub deadline: i64,
    /// Whether the entity was asleep.
    pub sleeping: bool,
}

/// An object that receives wakeups from the [`TickDriver`](crate::TickDriver).
///
/// Implementors embed a [`TimedObject`] and hand it out through [`timer`].
///
/// `is_deleted` and `can_tick` are consulted while the timer lock is held, so
/// they must not call the locking methods of their own [`TimedObject`].
///
/// [`timer`]: Tickable::timer
pub trait Tickable: Send + Sync {
    /// The entity's timer.
    fn timer(&self) -> &TimedObject;

    /// Whether the entity has been deleted. Deleted entities never arm timers
    /// and are never ticked.
    fn is_deleted(&self) -> bool;

    /// Whether the entity may tick right now.
    ///
    /// An entity that is swept while this returns `false` keeps its expired
    /// deadline so [`TimerGuard::go_awake`] can pick it up again.
    fn can_tick(&self, timer: &TimerGuard<'_>) -> bool {
        !timer.is_sleeping()
    }

    /// Runs the entity's wakeup.
    ///
    /// The driver holds the timer lock for the whole call; reschedule through
    /// `timer`, never through [`TimedObject`] on `self`, which would deadlock.
    /// The timer is already disarmed when this is called, so returning without
    /// a new `set_timeout` leaves the entity unarmed.
    ///
    /// The return value only feeds statistics.
    fn on_tick(&self, timer: &mut TimerGuard<'_>) -> bool;
}

#[derive(Debug, Default)]
struct TimerState {
    deadline: i64,
    sleeping: bool,
    /// The registry key this timer currently owns. `None` with a positive
    /// deadline means the timer was swept while the entity could not tick.
    registration: Option<TickKey>,
}

impl TimerState {
    #[inline]
    fn is_timer_set(&self) -> bool {
        self.deadline > 0
    }

    #[inline]
    fn timer_diff(&self, now: i64) -> i64 {
        self.deadline - now
    }

    fn timer_adjusted(&self, now: i64, unit: i64) -> i64 {
        if !self.is_timer_set() {
            return -1;
        }
        self.timer_diff(now).max(0) / unit
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            deadline: self.deadline,
            sleeping: self.sleeping,
        }
    }
}

/// Timer state embedded in every timed entity.
///
/// Dropping a `TimedObject` removes its registration, so an entity can never be
/// swept after its memory is gone.
pub struct TimedObject {
    id: TimerId,
    category: Category,
    owner: Weak<dyn Tickable>,
    clock: Arc<dyn WorldClock>,
    registry: Arc<TickRegistry>,
    state: SyncRwLock<TimerState>,
}

impl TimedObject {
    /// Creates an unarmed timer bound to `world`.
    ///
    /// `owner` is the entity embedding this timer, usually obtained through
    /// [`Arc::new_cyclic`]. Timers cannot be armed until the owner is fully
    /// constructed.
    #[must_use]
    pub fn new(world: &World, category: Category, owner: Weak<dyn Tickable>) -> Self {
        Self {
            id: world.registry().allocate_id(),
            category,
            owner,
            clock: world.clock().clone(),
            registry: world.registry().clone(),
            state: SyncRwLock::new(TimerState::default()),
        }
    }

    /// This timer's id in the registry.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> TimerId {
        self.id
    }

    /// The instrumentation category.
    #[inline]
    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Takes the timer's exclusive lock.
    ///
    /// The lock is not reentrant: while a guard is alive, the locking methods
    /// of this `TimedObject` must not be called from the same thread.
    pub fn lock(&self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            state: self.state.write(),
        }
    }

    /// Arms the timer `delay_ms` milliseconds from now, or cancels it when
    /// `delay_ms` is negative. See [`TimerGuard::set_timeout`].
    pub fn set_timeout(&self, delay_ms: i64) {
        self.lock().set_timeout(delay_ms);
    }

    /// Arms the timer `seconds` from now.
    pub fn set_timeout_seconds(&self, seconds: i64) {
        self.lock().set_timeout_seconds(seconds);
    }

    /// Arms the timer `tenths` of a second from now.
    pub fn set_timeout_tenths(&self, tenths: i64) {
        self.lock().set_timeout_tenths(tenths);
    }

    /// Puts the entity to sleep. The deadline is left untouched.
    pub fn go_sleep(&self) {
        self.lock().go_sleep();
    }

    /// Wakes the entity up. See [`TimerGuard::go_awake`].
    pub fn go_awake(&self) {
        self.lock().go_awake();
    }

    /// Disarms the timer and drops its registration, regardless of the
    /// entity's deleted state. Entity kinds call this from their delete path.
    pub fn deregister(&self) {
        self.lock().deregister();
    }

    /// Restores persisted timer state. See [`TimerGuard::restore`].
    pub fn restore(&self, snapshot: TimerSnapshot) {
        self.lock().restore(snapshot);
    }

    /// Whether the entity is asleep.
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.state.read().sleeping
    }

    /// Whether a deadline is set.
    #[must_use]
    pub fn is_timer_set(&self) -> bool {
        self.state.read().is_timer_set()
    }

    /// Whether the timer currently owns a registry entry.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.state.read().registration.is_some()
    }

    /// Whether the deadline has been reached.
    #[must_use]
    pub fn is_timer_expired(&self) -> bool {
        self.timer_diff() <= 0
    }

    /// The stored absolute deadline, `0` when unarmed.
    #[must_use]
    pub fn timeout_raw(&self) -> i64 {
        self.state.read().deadline
    }

    /// Milliseconds until the deadline. Negative once it has passed.
    #[must_use]
    pub fn timer_diff(&self) -> i64 {
        self.state.read().timer_diff(self.clock.now())
    }

    /// Milliseconds until the deadline, `0` if overdue, `-1` if unarmed.
    #[must_use]
    pub fn timer_adjusted(&self) -> i64 {
        self.state.read().timer_adjusted(self.clock.now(), 1)
    }

    /// Like [`timer_adjusted`](Self::timer_adjusted), in tenths of a second.
    #[must_use]
    pub fn timer_adjusted_tenths(&self) -> i64 {
        self.state
            .read()
            .timer_adjusted(self.clock.now(), MSECS_PER_TENTH)
    }

    /// Like [`timer_adjusted`](Self::timer_adjusted), in seconds.
    #[must_use]
    pub fn timer_adjusted_seconds(&self) -> i64 {
        self.state
            .read()
            .timer_adjusted(self.clock.now(), MSECS_PER_SEC)
    }

    /// The persistent part of the timer.
    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        self.state.read().snapshot()
    }

    fn owner_deleted(&self) -> bool {
        self.owner
            .upgrade()
            .is_none_or(|owner| owner.is_deleted())
    }
}

impl Drop for TimedObject {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

impl fmt::Debug for TimedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedObject")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a [`TimedObject`].
///
/// Returned by [`TimedObject::lock`] and passed to [`Tickable::on_tick`].
pub struct TimerGuard<'a> {
    timer: &'a TimedObject,
    state: SyncRwLockWriteGuard<'a, TimerState>,
}

impl TimerGuard<'_> {
    /// The id of the locked timer.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.timer.id
    }

    /// The category of the locked timer.
    #[inline]
    #[must_use]
    pub fn category(&self) -> Category {
        self.timer.category
    }

    /// Arms the timer `delay_ms` milliseconds from now, replacing any pending
    /// wakeup. A delay of `0` fires on the next tick. A negative delay cancels
    /// the timer.
    ///
    /// Does nothing once the entity is deleted.
    pub fn set_timeout(&mut self, delay_ms: i64) {
        if self.timer.owner_deleted() {
            return;
        }

        if delay_ms < 0 {
            self.timer.registry.remove(self.timer.id);
            self.state.deadline = 0;
            self.state.registration = None;
            log::trace!("Timer {} cancelled", self.timer.id);
            return;
        }

        // 0 is the unarmed marker, so the earliest real deadline is 1.
        let deadline = self.timer.clock.now().saturating_add(delay_ms).max(1);
        let key = self
            .timer
            .registry
            .add(deadline, self.timer.id, self.timer.owner.clone());
        self.state.deadline = deadline;
        self.state.registration = Some(key);
        log::trace!(
            "Timer {} armed for {deadline} (delay={delay_ms})",
            self.timer.id
        );
    }

    /// Arms the timer `seconds` from now.
    pub fn set_timeout_seconds(&mut self, seconds: i64) {
        self.set_timeout(seconds_to_millis(seconds));
    }

    /// Arms the timer `tenths` of a second from now.
    pub fn set_timeout_tenths(&mut self, tenths: i64) {
        self.set_timeout(tenths_to_millis(tenths));
    }

    /// Puts the entity to sleep. The deadline is left untouched.
    pub fn go_sleep(&mut self) {
        self.state.sleeping = true;
    }

    /// Wakes the entity up.
    ///
    /// A deadline that passed while asleep was dropped from the registry when
    /// it was swept, so it is rearmed for the next tick. A deleted entity
    /// loses its deadline instead.
    pub fn go_awake(&mut self) {
        self.state.sleeping = false;
        if self.timer.owner_deleted() {
            self.deregister();
            return;
        }
        let now = self.timer.clock.now();
        if self.state.deadline > 0 && self.state.deadline <= now {
            self.set_timeout(1);
        }
    }

    /// Disarms the timer and drops its registration, even for deleted
    /// entities.
    pub fn deregister(&mut self) {
        self.timer.registry.remove(self.timer.id);
        self.state.deadline = 0;
        self.state.registration = None;
    }

    /// Restores persisted timer state.
    ///
    /// An armed deadline is registered at its absolute time, so one that is
    /// already in the past fires on the next tick. Deleted entities only get
    /// the sleep flag back.
    pub fn restore(&mut self, snapshot: TimerSnapshot) {
        self.state.sleeping = snapshot.sleeping;
        if snapshot.deadline > 0 && !self.timer.owner_deleted() {
            let key = self
                .timer
                .registry
                .add(snapshot.deadline, self.timer.id, self.timer.owner.clone());
            self.state.deadline = snapshot.deadline;
            self.state.registration = Some(key);
        } else {
            self.deregister();
        }
    }

    /// Whether the entity is asleep.
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.state.sleeping
    }

    /// Whether a deadline is set.
    #[must_use]
    pub fn is_timer_set(&self) -> bool {
        self.state.is_timer_set()
    }

    /// Whether the deadline has been reached.
    #[must_use]
    pub fn is_timer_expired(&self) -> bool {
        self.timer_diff() <= 0
    }

    /// The stored absolute deadline, `0` when unarmed.
    #[must_use]
    pub fn timeout_raw(&self) -> i64 {
        self.state.deadline
    }

    /// Milliseconds until the deadline. Negative once it has passed.
    #[must_use]
    pub fn timer_diff(&self) -> i64 {
        self.state.timer_diff(self.timer.clock.now())
    }

    /// Milliseconds until the deadline, `0` if overdue, `-1` if unarmed.
    #[must_use]
    pub fn timer_adjusted(&self) -> i64 {
        self.state.timer_adjusted(self.timer.clock.now(), 1)
    }

    /// Like [`timer_adjusted`](Self::timer_adjusted), in tenths of a second.
    #[must_use]
    pub fn timer_adjusted_tenths(&self) -> i64 {
        self.state
            .timer_adjusted(self.timer.clock.now(), MSECS_PER_TENTH)
    }

    /// Like [`timer_adjusted`](Self::timer_adjusted), in seconds.
    #[must_use]
    pub fn timer_adjusted_seconds(&self) -> i64 {
        self.state
            .timer_adjusted(self.timer.clock.now(), MSECS_PER_SEC)
    }

    /// The persistent part of the timer.
    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        self.state.snapshot()
    }

    pub(crate) fn registration(&self) -> Option<TickKey> {
        self.state.registration
    }

    /// Zeroes the deadline without touching the registry.
    ///
    /// Only valid once the registry entry is gone, which is the case for
    /// everything handed out by a sweep.
    pub(crate) fn clear_timeout(&mut self) {
        self.state.deadline = 0;
        self.state.registration = None;
    }

    /// Forgets the registry entry but keeps the expired deadline.
    pub(crate) fn park(&mut self) {
        self.state.registration = None;
    }
}
