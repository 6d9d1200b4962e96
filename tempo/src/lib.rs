//! # Tempo
//!
//! The server shell around the scheduler core: loads the config, owns the
//! world clock, and drives ticks at a fixed rate until it is told to stop.
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    missing_docs,
    clippy::unwrap_used
)]
#![allow(
    clippy::single_call_fn,
    clippy::multiple_inherent_impl,
    clippy::shadow_unrelated,
    clippy::missing_errors_doc,
    clippy::struct_excessive_bools,
    clippy::needless_pass_by_value,
    clippy::cargo_common_metadata
)]
use std::mem;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tempo_core::{Category, GameClock, TickDriver, TickReport, Tickable, TimerId, World};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod entities;
pub mod logger;

use config::ServerConfig;
use entities::{Effect, Graveyard, Pulse};

/// Period of the sample pulses, in milliseconds.
const PULSE_PERIOD_MS: i64 = 1_000;
/// Charges of a freshly spawned effect.
const EFFECT_CHARGES: u32 = 10;
/// Tenths of a second between effect charges.
const EFFECT_INTERVAL_TENTHS: i64 = 5;

/// The main server struct.
pub struct TempoServer {
    /// The cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    /// The loaded configuration.
    pub config: ServerConfig,
    clock: Arc<GameClock>,
    driver: TickDriver,
    entities: FxHashMap<TimerId, Arc<dyn Tickable>>,
    graveyard: Graveyard,
}

impl TempoServer {
    /// Creates a server with an empty world whose clock starts at one tick.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        log::info!("Starting Tempo at {} ticks per second", config.tick_rate);

        let clock = Arc::new(GameClock::new(config.millis_per_tick()));
        let world = World::new(clock.clone());
        let mut driver = TickDriver::new(world);
        if let Some(threshold) = config.overrun_warning() {
            driver = driver.with_overrun_warning(threshold);
        }

        Self {
            cancel_token: CancellationToken::new(),
            config,
            clock,
            driver,
            entities: FxHashMap::default(),
            graveyard: Graveyard::default(),
        }
    }

    /// The simulated world.
    #[must_use]
    pub fn world(&self) -> &World {
        self.driver.world()
    }

    /// The tick driver, for statistics.
    #[must_use]
    pub fn driver(&self) -> &TickDriver {
        &self.driver
    }

    /// Number of entities still alive.
    #[must_use]
    pub fn live_entities(&self) -> usize {
        self.entities.len()
    }

    /// Takes ownership of `entity`. Entities that delete themselves are
    /// expected to report to [`graveyard`](Self::graveyard).
    pub fn spawn(&mut self, entity: Arc<dyn Tickable>) {
        self.entities.insert(entity.timer().id(), entity);
    }

    /// Where self-deleting entities report their ids.
    #[must_use]
    pub fn graveyard(&self) -> &Graveyard {
        &self.graveyard
    }

    /// Spawns the sample population from the config, with start times
    /// staggered so they do not all fire on the same tick.
    pub fn populate(&mut self) {
        let pulses = self.config.pulses;
        let effects = self.config.effects;

        for i in 0..pulses {
            let pulse = Pulse::new(self.world(), PULSE_PERIOD_MS);
            pulse.timer().set_timeout(stagger(i, PULSE_PERIOD_MS));
            self.spawn(pulse);
        }
        for i in 0..effects {
            let effect = Effect::new(
                self.world(),
                EFFECT_CHARGES,
                EFFECT_INTERVAL_TENTHS,
                &self.graveyard,
            );
            effect
                .timer()
                .set_timeout_tenths(stagger(i, EFFECT_INTERVAL_TENTHS));
            self.spawn(effect);
        }

        log::info!("Spawned {pulses} pulses and {effects} effects");
    }

    /// Advances the world clock by one tick and delivers everything due.
    ///
    /// Entities that reported their deletion are released afterwards, which
    /// drops their timers.
    pub fn step(&mut self) -> TickReport {
        let now = self.clock.advance(self.config.millis_per_tick());
        let span = tracing::debug_span!("tick", now);
        let _enter = span.enter();

        let report = self.driver.run_tick();

        let buried = mem::take(&mut *self.graveyard.lock());
        if !buried.is_empty() {
            for id in &buried {
                self.entities.remove(id);
            }
            log::debug!("Released {} deleted entities", buried.len());
        }

        report
    }

    /// Runs ticks at the configured rate until the cancel token fires.
    pub async fn run(&mut self) {
        log::info!("Started Tempo");

        let mut interval = time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let cancel_token = self.cancel_token.clone();

        loop {
            select! {
                () = cancel_token.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.step();
                }
            }
        }

        let stats = self.driver.stats();
        log::info!(
            "Stopped after {} ticks (avg {:.3} mspt, slowest {:?})",
            stats.ticks(),
            stats.average_mspt(),
            stats.slowest_tick()
        );
        for category in Category::ALL {
            let counters = stats.category(category);
            if counters.ticked + counters.skipped == 0 {
                continue;
            }
            log::info!(
                "  {}: {} ticked, {} failed, {} skipped, {:?} busy",
                category.name(),
                counters.ticked,
                counters.failed,
                counters.skipped,
                counters.busy
            );
        }
    }

    /// Stops the server.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }
}

/// Spreads the `i`th entity over one `period`, never returning zero.
fn stagger(i: usize, period: i64) -> i64 {
    let period = period.max(1);
    (i as i64 % period) + 1
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tempo_core::{TimedObject, TimerGuard};

    use super::*;

    fn small_config() -> ServerConfig {
        ServerConfig {
            pulses: 50,
            effects: 20,
            overrun_warn_ms: 0,
            ..ServerConfig::default()
        }
    }

    /// Never due within a test, counts how often it is asked about deletion.
    struct Idle {
        timer: TimedObject,
        queries: Arc<AtomicUsize>,
    }

    impl Idle {
        fn new(world: &World, queries: &Arc<AtomicUsize>) -> Arc<Self> {
            Arc::new_cyclic(|weak: &Weak<Self>| {
                let owner: Weak<dyn Tickable> = weak.clone();
                Self {
                    timer: TimedObject::new(world, Category::Other, owner),
                    queries: queries.clone(),
                }
            })
        }
    }

    impl Tickable for Idle {
        fn timer(&self) -> &TimedObject {
            &self.timer
        }

        fn is_deleted(&self) -> bool {
            self.queries.fetch_add(1, Ordering::Relaxed);
            false
        }

        fn on_tick(&self, _timer: &mut TimerGuard<'_>) -> bool {
            true
        }
    }

    #[test]
    fn test_stagger_spreads_within_period() {
        assert_eq!(stagger(0, 1_000), 1);
        assert_eq!(stagger(999, 1_000), 1_000);
        assert_eq!(stagger(1_000, 1_000), 1);
        assert_eq!(stagger(3, 0), 1);
    }

    #[test]
    fn test_step_runs_population() {
        let mut server = TempoServer::new(small_config());
        server.populate();
        assert_eq!(server.live_entities(), 70);
        assert_eq!(server.world().registry().len(), 70);

        // Ten seconds of world time at 50ms per tick.
        for _ in 0..200 {
            server.step();
        }

        let stats = server.driver().stats();
        assert_eq!(stats.ticks(), 200);
        assert!(stats.category(Category::Sector).ticked >= 50 * 9);
        assert_eq!(
            stats.category(Category::Item).ticked,
            20 * u64::from(EFFECT_CHARGES)
        );

        // Every effect ran out and was released, which dropped its timer.
        assert_eq!(server.live_entities(), 50);
        assert_eq!(server.world().registry().len(), 50);
    }

    #[test]
    fn test_step_leaves_idle_entities_alone() {
        let mut server = TempoServer::new(small_config());
        let queries = Arc::new(AtomicUsize::new(0));
        for _ in 0..10_000 {
            let idle = Idle::new(server.world(), &queries);
            idle.timer().set_timeout(1_000_000);
            server.spawn(idle);
        }
        queries.store(0, Ordering::Relaxed);

        let report = server.step();
        assert_eq!(report.due, 0);
        assert_eq!(queries.load(Ordering::Relaxed), 0);
        assert_eq!(server.live_entities(), 10_000);
    }

    #[test]
    fn test_dispelled_effect_is_released() {
        let mut server = TempoServer::new(small_config());
        let effect = Effect::new(server.world(), 5, 1, server.graveyard());
        effect.timer().set_timeout_tenths(1);
        let id = effect.timer().id();
        server.spawn(effect.clone());

        effect.dispel();
        drop(effect);
        server.step();

        assert_eq!(server.live_entities(), 0);
        assert!(!server.world().registry().contains(id));
        assert!(server.graveyard().lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let mut server = TempoServer::new(small_config());
        server.populate();

        let token = server.cancel_token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(500)).await;
            token.cancel();
        });
        server.run().await;

        assert!(server.driver().stats().ticks() >= 5);
    }
}
