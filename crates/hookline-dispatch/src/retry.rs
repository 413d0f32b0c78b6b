//! Exponential backoff with cap and jitter for failed deliveries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Retry policy applied to every delivery job.
///
/// Delays grow exponentially from `base_delay` up to `max_delay`; the
/// pre-jitter schedule is monotone non-decreasing in the attempt number.
/// Jitter spreads retries of correlated failures apart.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum delivery attempts per job, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Jitter fraction (0.0 to 1.0) applied around the computed delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// True once `attempt` failures exhaust the budget and the job goes
    /// terminal.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Pre-jitter delay for the given 1-based attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        std::cmp::min(self.base_delay.saturating_mul(multiplier), self.max_delay)
    }

    /// Earliest wall-clock time the next attempt may run.
    pub fn next_attempt_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = apply_jitter(self.delay(attempt), self.jitter_factor);
        match chrono::Duration::from_std(delay) {
            Ok(delay) => now + delay,
            Err(_) => now + chrono::Duration::from_std(self.max_delay).unwrap_or_default(),
        }
    }
}

/// Randomizes a delay by up to `jitter_factor` in either direction.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();
    let range = duration.as_secs_f64() * clamped;
    let offset = rng.random_range(-range..=range);
    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy { jitter_factor: 0.0, ..Default::default() }
    }

    #[test]
    fn delays_double_per_attempt() {
        let policy = no_jitter();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
    }

    #[test]
    fn schedule_is_monotone_and_capped() {
        let policy = no_jitter();
        let mut previous = Duration::ZERO;
        for attempt in 1..=32 {
            let delay = policy.delay(attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(policy.delay(32), policy.max_delay);
    }

    #[test]
    fn budget_exhaustion() {
        let policy = RetryPolicy { max_attempts: 3, ..Default::default() };
        assert!(!policy.is_exhausted(1));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn next_attempt_lands_in_jitter_window() {
        let policy = RetryPolicy { jitter_factor: 0.5, ..Default::default() };
        let now = Utc::now();
        for _ in 0..20 {
            let at = policy.next_attempt_at(3, now);
            let delta = (at - now).num_milliseconds();
            // 4s base delay with ±50% jitter.
            assert!((2_000..=6_000).contains(&delta), "delta {delta}ms out of window");
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = no_jitter();
        let now = Utc::now();
        assert_eq!(policy.next_attempt_at(2, now), now + chrono::Duration::seconds(2));
    }
}
