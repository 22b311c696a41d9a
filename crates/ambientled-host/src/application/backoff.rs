//! Exponential reconnect delay for controller links.
//!
//! After a failed connect or a failed send the delay doubles, starting at
//! `initial` and capped at `max`: 500 ms, 1 s, 2 s, 4 s … 30 s with the
//! defaults.  A successful connect resets it.

use std::time::{Duration, Instant};

/// Reconnect schedule settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Tracks when the next reconnect attempt is allowed.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: u32,
    next_attempt: Option<Instant>,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            next_attempt: None,
        }
    }

    /// Returns `true` if an attempt may be made at `now`.
    pub fn ready(&self, now: Instant) -> bool {
        self.next_attempt.map_or(true, |at| now >= at)
    }

    /// Records a failure at `now` and returns the delay until the next attempt.
    pub fn fail(&mut self, now: Instant) -> Duration {
        let delay = self.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.next_attempt = Some(now + delay);
        delay
    }

    /// Clears the failure count after a successful connect.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
    }

    /// Number of consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn delay_for(&self, failures: u32) -> Duration {
        // 2^16 × initial is past any sane cap; stop shifting there.
        let factor = 1u32 << failures.min(16);
        self.policy
            .initial
            .saturating_mul(factor)
            .min(self.policy.max)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_backoff_is_ready_immediately() {
        let backoff = Backoff::new(BackoffPolicy::default());

        assert!(backoff.ready(Instant::now()));
        assert_eq!(backoff.failures(), 0);
    }

    #[test]
    fn test_delays_double_until_capped() {
        // Arrange
        let mut backoff = Backoff::new(BackoffPolicy {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(3),
        });
        let now = Instant::now();

        // Act
        let delays: Vec<Duration> = (0..5).map(|_| backoff.fail(now)).collect();

        // Assert
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
        assert_eq!(backoff.failures(), 5);
    }

    #[test]
    fn test_not_ready_until_delay_elapses() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let now = Instant::now();

        backoff.fail(now);

        assert!(!backoff.ready(now));
        assert!(!backoff.ready(now + Duration::from_millis(499)));
        assert!(backoff.ready(now + Duration::from_millis(500)));
    }

    #[test]
    fn test_reset_clears_schedule() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let now = Instant::now();
        backoff.fail(now);
        backoff.fail(now);

        backoff.reset();

        assert!(backoff.ready(now));
        assert_eq!(backoff.fail(now), Duration::from_millis(500));
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let now = Instant::now();

        for _ in 0..100 {
            backoff.fail(now);
        }

        assert_eq!(backoff.fail(now), Duration::from_secs(30));
    }
}
