//! Per-tick wakeup delivery.

use std::time::{Duration, Instant};

use crate::registry::DueEntry;
use crate::timer::Category;
use crate::World;

/// Callback counters for one [`Category`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    /// Callbacks that ran.
    pub ticked: u64,
    /// Callbacks that ran and reported failure.
    pub failed: u64,
    /// Due entities that could not tick and were parked.
    pub skipped: u64,
    /// Time spent inside callbacks.
    pub busy: Duration,
}

/// Running totals kept by a [`TickDriver`].
#[derive(Debug, Clone, Default)]
pub struct TickStats {
    categories: [CategoryStats; Category::COUNT],
    ticks: u64,
    total: Duration,
    slowest: Duration,
}

impl TickStats {
    /// Counters for one category.
    #[must_use]
    pub fn category(&self, category: Category) -> &CategoryStats {
        &self.categories[category.index()]
    }

    /// Number of ticks processed.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Longest tick seen so far.
    #[must_use]
    pub const fn slowest_tick(&self) -> Duration {
        self.slowest
    }

    /// Average milliseconds per tick.
    #[must_use]
    pub fn average_mspt(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1000.0 / self.ticks as f64
    }

    fn record_tick(&mut self, elapsed: Duration) {
        self.ticks += 1;
        self.total += elapsed;
        self.slowest = self.slowest.max(elapsed);
    }
}

/// What happened during one [`TickDriver::run_tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// World time the tick ran at.
    pub now: i64,
    /// Entities handed out by the sweep.
    pub due: usize,
    /// Callbacks that ran.
    pub ticked: usize,
    /// Entities parked because they could not tick.
    pub skipped: usize,
    /// Entries dropped because the entity was rescheduled, cancelled or
    /// deleted after the sweep took them.
    pub stale: usize,
    /// Wall time spent on the tick.
    pub elapsed: Duration,
}

/// Delivers due wakeups once per simulation tick.
///
/// The driver is meant to be owned by the single thread that advances the
/// world clock. Other threads may arm and cancel timers concurrently.
pub struct TickDriver {
    world: World,
    stats: TickStats,
    overrun_warning: Option<Duration>,
}

impl TickDriver {
    /// Creates a driver for `world`.
    #[must_use]
    pub fn new(world: World) -> Self {
        Self {
            world,
            stats: TickStats::default(),
            overrun_warning: None,
        }
    }

    /// Logs a warning whenever a tick takes longer than `threshold`.
    #[must_use]
    pub fn with_overrun_warning(mut self, threshold: Duration) -> Self {
        self.overrun_warning = Some(threshold);
        self
    }

    /// The world this driver ticks.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Sweeps everything due at the current world time and runs it.
    pub fn run_tick(&mut self) -> TickReport {
        let started = Instant::now();
        let now = self.world.now();
        let due = self.world.registry().sweep(now);

        let mut report = self.deliver(now, due);
        report.elapsed = started.elapsed();
        self.stats.record_tick(report.elapsed);

        if report.due > 0 {
            log::debug!(
                "Tick at {now}: {} due, {} ticked, {} skipped, {} stale",
                report.due,
                report.ticked,
                report.skipped,
                report.stale
            );
        }
        if let Some(threshold) = self.overrun_warning
            && report.elapsed > threshold
        {
            log::warn!(
                "Tick at {now} took {:?} for {} due timers (budget {threshold:?})",
                report.elapsed,
                report.due
            );
        }

        report
    }

    fn deliver(&mut self, now: i64, due: Vec<DueEntry>) -> TickReport {
        let mut report = TickReport {
            now,
            due: due.len(),
            ..TickReport::default()
        };

        for DueEntry { key, entity, .. } in due {
            let category = entity.timer().category();
            let mut timer = entity.timer().lock();

            // Someone rearmed or cancelled between the sweep and this lock.
            if timer.registration() != Some(key) {
                report.stale += 1;
                continue;
            }
            if entity.is_deleted() {
                timer.clear_timeout();
                report.stale += 1;
                continue;
            }
            if !entity.can_tick(&timer) {
                timer.park();
                report.skipped += 1;
                self.stats.categories[category.index()].skipped += 1;
                continue;
            }

            timer.clear_timeout();
            let started = Instant::now();
            let ok = entity.on_tick(&mut timer);
            drop(timer);

            let stats = &mut self.stats.categories[category.index()];
            stats.ticked += 1;
            stats.busy += started.elapsed();
            if !ok {
                stats.failed += 1;
            }
            report.ticked += 1;
        }

        report
    }
}
