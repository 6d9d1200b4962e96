//! World-level pending wakeup registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use rustc_hash::FxHashMap;
use tempo_utils::locks::SyncMutex;

use crate::timer::{Tickable, TimerId};

/// Position of a registration in the registry.
///
/// Keys order by deadline first, then by insertion sequence, which is what
/// makes entities sharing a deadline come out in the order they were added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickKey {
    /// Absolute deadline in milliseconds.
    pub deadline: i64,
    /// Registry-wide insertion counter.
    sequence: u64,
}

/// An entity handed out by [`TickRegistry::sweep`].
pub struct DueEntry {
    /// The registration that came due.
    pub key: TickKey,
    /// The entity's timer id.
    pub id: TimerId,
    /// The entity itself.
    pub entity: Arc<dyn Tickable>,
}

struct Pending {
    id: TimerId,
    entity: Weak<dyn Tickable>,
}

#[derive(Default)]
struct RegistryState {
    /// Pending wakeups. Entries sharing a deadline form that deadline's bucket.
    pending: BTreeMap<TickKey, Pending>,
    /// Reverse index so an entity can be found without knowing its deadline.
    by_timer: FxHashMap<TimerId, TickKey>,
    next_sequence: u64,
}

/// Index of every armed timer, ordered by deadline.
///
/// # Architecture
///
/// - `pending` is an ordered map keyed by [`TickKey`], so a sweep only touches
///   entries that are actually due
/// - `by_timer` maps each timer to its single key, which keeps an entity in at
///   most one bucket and makes removal O(log n)
/// - The registry only holds weak references; ownership stays with the world
///
/// All mutations go through one lock. The registry never calls into entity
/// code while holding it, so entity locks can always be taken first.
pub struct TickRegistry {
    state: SyncMutex<RegistryState>,
    next_timer_id: AtomicU64,
}

impl TickRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SyncMutex::new(RegistryState::default()),
            next_timer_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn allocate_id(&self) -> TimerId {
        TimerId(self.next_timer_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers `id` under `deadline`, dropping any earlier registration for
    /// the same timer first.
    pub(crate) fn add(&self, deadline: i64, id: TimerId, entity: Weak<dyn Tickable>) -> TickKey {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(previous) = state.by_timer.remove(&id) {
            state.pending.remove(&previous);
        }

        let key = TickKey {
            deadline,
            sequence: state.next_sequence,
        };
        state.next_sequence += 1;

        state.pending.insert(key, Pending { id, entity });
        state.by_timer.insert(id, key);
        key
    }

    /// Removes whatever registration `id` has. Returns `false` if there was
    /// none.
    pub(crate) fn remove(&self, id: TimerId) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.by_timer.remove(&id) {
            Some(key) => {
                state.pending.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Takes every registration due at or before `now` out of the registry.
    ///
    /// Entries come out by ascending deadline and, within a deadline, in
    /// insertion order. Entities that were dropped or deleted in the meantime
    /// are not returned; deleted ones have their deadline cleared.
    ///
    /// Registrations made while the returned entries are being processed land
    /// in the registry again and wait for the next sweep, even if they are
    /// already due.
    #[must_use]
    pub fn sweep(&self, now: i64) -> Vec<DueEntry> {
        let popped = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut popped = Vec::new();

            while let Some(entry) = state.pending.first_entry() {
                if entry.key().deadline > now {
                    break;
                }
                let (key, pending) = entry.remove_entry();
                state.by_timer.remove(&pending.id);
                popped.push((key, pending));
            }
            popped
        };

        if !popped.is_empty() {
            log::trace!("Swept {} due timers at {now}", popped.len());
        }

        popped
            .into_iter()
            .filter_map(|(key, pending)| {
                let entity = pending.entity.upgrade()?;
                if entity.is_deleted() {
                    let mut timer = entity.timer().lock();
                    if timer.registration() == Some(key) {
                        timer.clear_timeout();
                    }
                    log::trace!("Skipping deleted timer {}", pending.id);
                    return None;
                }
                Some(DueEntry {
                    key,
                    id: pending.id,
                    entity,
                })
            })
            .collect()
    }

    /// Whether `id` currently has a registration.
    #[must_use]
    pub fn contains(&self, id: TimerId) -> bool {
        self.state.lock().by_timer.contains_key(&id)
    }

    /// Returns the number of registered timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// The earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<i64> {
        self.state
            .lock()
            .pending
            .first_key_value()
            .map(|(key, _)| key.deadline)
    }

    /// Timers registered for exactly `deadline`, in tick order.
    #[must_use]
    pub fn bucket(&self, deadline: i64) -> Vec<TimerId> {
        let start = TickKey {
            deadline,
            sequence: 0,
        };
        let end = TickKey {
            deadline,
            sequence: u64::MAX,
        };
        self.state
            .lock()
            .pending
            .range(start..=end)
            .map(|(_, pending)| pending.id)
            .collect()
    }

    /// Number of distinct deadlines with at least one registration.
    ///
    /// Walks every entry; meant for diagnostics, not the tick path.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        let state = self.state.lock();
        let mut count = 0;
        let mut last = None;
        for key in state.pending.keys() {
            if last != Some(key.deadline) {
                count += 1;
                last = Some(key.deadline);
            }
        }
        count
    }
}

impl Default for TickRegistry {
    fn default() -> Self {
        Self::new()
    }
}
