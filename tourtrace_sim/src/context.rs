//! Simulation context implementing TrackerContext for deterministic testing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tourtrace_env::TrackerContext;

/// Wall-clock origin of the virtual timeline: 2024-01-01 00:00:00 UTC.
const SIM_EPOCH_MS: u64 = 1_704_067_200_000;

/// Simulation context backed by a manually advanced virtual clock.
///
/// `sleep` advances the clock instead of waiting, so backoff delays inside
/// the client complete instantly and reproducibly.
pub struct SimContext {
    /// Master seed for this simulation (for logging/repro)
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time += duration.as_nanos() as u64;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap()
    }

    /// Returns the context's seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
        }
    }
}

#[async_trait]
impl TrackerContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn epoch_ms(&self) -> u64 {
        SIM_EPOCH_MS + self.now().as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        // In simulation, sleeping is advancing the clock
        self.advance_time(duration);
    }
}
