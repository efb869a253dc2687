//! Exponential backoff with jitter for channel rejoin attempts.
//!
//! The channel transport reconnects on its own; room membership does not
//! survive the drop, so the client must re-enter the room itself, pacing
//! attempts with this schedule.

use rand::Rng;
use std::time::Duration;

/// Delay schedule for successive rejoin attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,

    /// Ceiling for the exponential growth
    pub max_delay: Duration,

    /// Growth factor per attempt
    pub multiplier: f64,

    /// Jitter fraction: each delay is scaled by a uniform factor in
    /// [1 - jitter, 1 + jitter]
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for the given zero-based attempt number.
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exp = self.multiplier.powi(attempt.min(32) as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());

        let factor = if self.jitter > 0.0 {
            1.0 + self.jitter * (rng.gen::<f64>() * 2.0 - 1.0)
        } else {
            1.0
        };

        Duration::from_secs_f64((capped * factor).max(0.0))
    }
}
