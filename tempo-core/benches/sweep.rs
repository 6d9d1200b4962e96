#![allow(missing_docs)]
//! Benchmarks for registry sweeps.
//!
//! The interesting number is how a sweep with a handful of due entities
//! behaves as the total population grows: it should stay flat.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::{Arc, Weak};

use tempo_core::{Category, GameClock, Tickable, TimedObject, TimerGuard, World};

/// Entities due per simulated millisecond.
const DUE_PER_MS: i64 = 10;

struct Ticker {
    timer: TimedObject,
    period: i64,
}

impl Ticker {
    fn spawn(world: &World, period: i64) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let owner: Weak<dyn Tickable> = weak.clone();
            Self {
                timer: TimedObject::new(world, Category::Item, owner),
                period,
            }
        })
    }
}

impl Tickable for Ticker {
    fn timer(&self) -> &TimedObject {
        &self.timer
    }

    fn is_deleted(&self) -> bool {
        false
    }

    fn on_tick(&self, timer: &mut TimerGuard<'_>) -> bool {
        timer.set_timeout(self.period);
        true
    }
}

fn bench_sweep_few_due(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_few_due");

    for population in [1_000_i64, 10_000, 100_000] {
        let clock = Arc::new(GameClock::new(1));
        let world = World::new(clock.clone());
        let period = population / DUE_PER_MS;
        let tickers: Vec<_> = (0..population)
            .map(|i| {
                let ticker = Ticker::spawn(&world, period);
                ticker.timer().set_timeout(1 + i / DUE_PER_MS);
                ticker
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::new("population", population),
            &population,
            |b, _| {
                b.iter(|| {
                    let now = clock.advance(1);
                    let due = world.registry().sweep(black_box(now));
                    // Put them back so the population stays constant.
                    for entry in &due {
                        entry.entity.timer().set_timeout(period);
                    }
                    black_box(due.len())
                });
            },
        );

        drop(tickers);
    }

    group.finish();
}

criterion_group!(benches, bench_sweep_few_due);
criterion_main!(benches);
