//! Exponential backoff policy for reconnection attempts.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter.
///
/// Delays grow as `base * 2^attempt`, capped at `max_delay`, with a ±20%
/// jitter so a fleet of instances does not reconnect in lockstep. When
/// `max_attempts` is set, `next_delay` returns `None` once the budget is
/// spent.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
            attempt: 0,
        }
    }

    /// The delay before the next attempt, or `None` when attempts are
    /// exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts
            && self.attempt >= max
        {
            return None;
        }

        let exponent = self.attempt.min(16);
        self.attempt += 1;

        let raw = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);

        let jitter = rand::thread_rng().gen_range(0.8..1.2_f64);
        let jittered = raw.mul_f64(jitter).min(self.max_delay);
        Some(jittered)
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), Some(8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_exponentially() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(60), None);

        let first = backoff.next_delay().unwrap();
        let second = backoff.next_delay().unwrap();
        let third = backoff.next_delay().unwrap();

        // With ±20% jitter: first in [80, 120]ms, second in [160, 240]ms,
        // third in [320, 480]ms
        assert!(first >= Duration::from_millis(80) && first <= Duration::from_millis(120));
        assert!(second >= Duration::from_millis(160) && second <= Duration::from_millis(240));
        assert!(third >= Duration::from_millis(320) && third <= Duration::from_millis(480));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(10),
            Duration::from_secs(15),
            None,
        );

        backoff.next_delay();
        let capped = backoff.next_delay().unwrap();
        assert!(capped <= Duration::from_secs(15));
    }

    #[test]
    fn test_attempts_exhausted() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(1), Duration::from_secs(1), Some(2));

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 2);
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(1), Duration::from_secs(1), Some(1));

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn test_large_attempt_count_does_not_overflow() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30), None);

        for _ in 0..100 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay <= Duration::from_secs(30));
        }
    }
}
