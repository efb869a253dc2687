//! Core environment context trait for the tracking client.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// Abstracts the host clock so the tracking client can run in both
/// production (tokio) and simulation (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: [`crate::TokioContext`] - wraps `tokio::time` and the system clock
/// - **Simulation**: `SimContext` - a manually advanced virtual clock
///
/// # Determinism
///
/// In simulation, `sleep` advances the virtual clock instead of waiting, so
/// a scenario that includes backoff delays still runs instantly and
/// reproducibly.
#[async_trait]
pub trait TrackerContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Used to stamp outbound samples; in simulation this is derived from
    /// the virtual clock plus a fixed epoch offset.
    fn epoch_ms(&self) -> u64;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`.
    /// In simulation: advances the virtual clock.
    async fn sleep(&self, duration: Duration);
}
