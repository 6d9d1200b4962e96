//! # Tempo Core
//!
//! The timed-entity scheduler. Every simulated object that wants delayed or
//! periodic callbacks embeds a [`TimedObject`] and implements [`Tickable`].
//!
//! # Architecture
//!
//! - [`WorldClock`] - Simulation time source, advanced by the server loop
//! - [`TimedObject`] - Per-entity timer state behind its own lock
//! - [`TickRegistry`] - Pending wakeups ordered by deadline
//! - [`TickDriver`] - Sweeps the registry once per tick and runs callbacks
//! - [`World`] - Owns the clock and registry that entities are bound to
#![warn(
    clippy::all,
    clippy::pedantic,
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

pub mod clock;
pub mod driver;
pub mod registry;
pub mod timer;
pub mod world;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{GameClock, WorldClock};
pub use driver::{CategoryStats, TickDriver, TickReport, TickStats};
pub use registry::{DueEntry, TickKey, TickRegistry};
pub use timer::{Category, Tickable, TimedObject, TimerGuard, TimerId, TimerSnapshot};
pub use world::World;
