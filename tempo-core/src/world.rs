//! This module contains the `World` struct, the context timed entities are
//! bound to.
use std::sync::Arc;

use crate::{TickRegistry, WorldClock};

/// The simulation context shared by every timed entity in a world.
///
/// Cloning is cheap and yields a handle to the same clock and registry.
#[derive(Clone)]
pub struct World {
    clock: Arc<dyn WorldClock>,
    registry: Arc<TickRegistry>,
}

impl World {
    /// Creates a world driven by `clock` with an empty registry.
    #[must_use]
    pub fn new(clock: Arc<dyn WorldClock>) -> Self {
        Self {
            clock,
            registry: Arc::new(TickRegistry::new()),
        }
    }

    /// The world's clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn WorldClock> {
        &self.clock
    }

    /// The world's pending-wakeup registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TickRegistry> {
        &self.registry
    }

    /// Current world time in milliseconds.
    #[inline]
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }
}
