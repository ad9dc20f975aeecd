//! Exponential backoff between attempts on the same cell.

use std::time::Duration;

/// Delay law: attempt 1 is immediate, attempt k >= 2 waits
/// `min(base * 2^(k-2), cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(8))
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Out-of-range values saturate instead of panicking: negative or NaN
    /// become zero, too large becomes `Duration::MAX`.
    pub fn from_secs_f64(base: f64, cap: f64) -> Self {
        Self::new(saturating_secs(base), saturating_secs(cap))
    }

    /// Delay to sleep before the 1-based `attempt`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }
}

fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}
