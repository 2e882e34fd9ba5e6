//! Retry backoff policy

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter, an attempt budget and a time budget.
///
/// Attempts are counted including the first request, so `max_attempts = 3`
/// allows two retries.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Upper bound for a computed delay
    pub cap: Duration,
    /// Random spread as a fraction of the delay (0.2 = ±20%)
    pub jitter: f64,
    pub max_attempts: u32,
    /// Total time budget for one call, retries included
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(30),
            jitter: 0.2,
            max_attempts: 3,
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Override the attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay after `attempt` failed attempts, before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = (self.base.as_millis() as f64 * factor).min(self.cap.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let spread = self.jitter.clamp(0.0, 1.0);
        if spread == 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(1.0 - spread..=1.0 + spread);
        delay.mul_f64(factor).min(self.cap)
    }

    /// How long to wait before the next attempt, or `None` to give up.
    ///
    /// `attempt` is the number of attempts already made. A server-supplied
    /// `hint` (from `Retry-After`) is taken as the minimum wait and is
    /// neither jittered nor capped.
    pub fn next_delay(
        &self,
        attempt: u32,
        elapsed: Duration,
        hint: Option<Duration>,
    ) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let delay = match hint {
            Some(hint) => hint,
            None => self.jittered(self.delay_for_attempt(attempt)),
        };

        match elapsed.checked_add(delay) {
            Some(total) if total <= self.max_elapsed => Some(delay),
            _ => None,
        }
    }
}
