//! Exponential backoff with positive jitter.
//!
//! `delay(k) = min(base · 2^k + jitter, max)` with
//! `jitter ∈ [0, 0.3 · base · 2^k)`.

use rand::Rng;
use std::time::Duration;

/// Hard cap on any computed delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Upper bound of the jitter as a fraction of the exponential term.
pub const JITTER_RATIO: f64 = 0.3;

// 2^64 already overflows any sensible base; keeps powi finite
const MAX_EXPONENT: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before retry number `attempt` (0 for the first retry).
    pub fn delay(&self, attempt: u32) -> Duration {
        let unit = rand::thread_rng().gen_range(0.0..1.0);
        self.delay_with_jitter(attempt, unit)
    }

    /// Deterministic form of [`delay`](Self::delay). `unit` in `[0, 1)`
    /// selects where in the jitter range the result falls.
    pub fn delay_with_jitter(&self, attempt: u32, unit: f64) -> Duration {
        let exponential =
            self.base.as_secs_f64() * 2f64.powi(attempt.min(MAX_EXPONENT) as i32);
        let jitter = exponential * JITTER_RATIO * unit.clamp(0.0, 1.0);
        let total = (exponential + jitter).min(self.max.as_secs_f64());
        Duration::from_secs_f64(total.max(0.0))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), MAX_BACKOFF)
    }
}
