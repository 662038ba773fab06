//! Reconnect delay policy.
//!
//! Consecutive failures back off exponentially from `base` with random
//! jitter, capped at `max_delay`. A `retry:` interval advised by the server
//! replaces the backoff for exactly one attempt. The attempt counter resets
//! whenever the stream reaches `Open`.

use rand::Rng;
use std::time::Duration;

use crate::models::ConnectionOptions;

/// Stateful delay calculator owned by the transport control task.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    backoff_jitter: Duration,
    server_jitter: Duration,
    attempt: u32,
    server_advised: Option<Duration>,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
            backoff_jitter: Duration::from_millis(1000),
            server_jitter: Duration::from_millis(500),
            attempt: 0,
            server_advised: None,
        }
    }

    /// Build from connection options. `auto_reconnect = false` yields a
    /// policy that never schedules an attempt.
    pub fn from_options(options: &ConnectionOptions) -> Self {
        let max_attempts = if options.auto_reconnect {
            options.max_reconnect_attempts
        } else {
            Some(0)
        };
        Self::new(options.reconnect_delay(), options.max_reconnect_delay(), max_attempts)
            .with_jitter(
                Duration::from_millis(options.backoff_jitter_ms),
                Duration::from_millis(options.server_retry_jitter_ms),
            )
    }

    pub fn with_jitter(mut self, backoff_jitter: Duration, server_jitter: Duration) -> Self {
        self.backoff_jitter = backoff_jitter;
        self.server_jitter = server_jitter;
        self
    }

    /// Consecutive attempts scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn server_advised(&self) -> Option<Duration> {
        self.server_advised
    }

    /// Record a `retry:` interval for the next attempt only.
    pub fn set_server_advised(&mut self, interval: Duration) {
        self.server_advised = Some(interval);
    }

    /// Called when the stream reaches `Open`.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        let delay = match self.server_advised.take() {
            Some(advised) => advised.saturating_add(random_jitter(self.server_jitter)),
            None => {
                let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
                let backoff = self
                    .base
                    .checked_mul(factor)
                    .unwrap_or(self.max_delay)
                    .saturating_add(random_jitter(self.backoff_jitter));
                backoff.min(self.max_delay)
            },
        };

        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}

/// Uniform jitter in `[0, upper)`.
fn random_jitter(upper: Duration) -> Duration {
    let upper_ms = upper.as_millis() as u64;
    if upper_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..upper_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(30), max_attempts)
    }

    #[test]
    fn test_backoff_doubles_with_jitter() {
        let mut p = policy(None);
        for attempt in 0..4u32 {
            let delay = p.next_delay().unwrap();
            let floor = Duration::from_millis(1000 * 2u64.pow(attempt));
            assert!(delay >= floor, "attempt {}: {:?} < {:?}", attempt, delay, floor);
            assert!(delay < floor + Duration::from_secs(1));
        }
        assert_eq!(p.attempt(), 4);
    }

    #[test]
    fn test_backoff_capped_at_max_delay() {
        let mut p = policy(None);
        for _ in 0..10 {
            p.next_delay();
        }
        assert_eq!(p.next_delay(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_server_advised_used_once() {
        let mut p = policy(Some(5));
        p.set_server_advised(Duration::from_millis(2000));

        let delay = p.next_delay().unwrap();
        assert!(delay >= Duration::from_millis(2000));
        assert!(delay < Duration::from_millis(2500));
        assert!(p.server_advised().is_none());

        // Second attempt falls back to backoff: base * 2^1 + jitter.
        let delay = p.next_delay().unwrap();
        assert!(delay >= Duration::from_millis(2000));
        assert!(delay < Duration::from_millis(3000));
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut p = policy(Some(2));
        assert!(p.next_delay().is_some());
        assert!(p.next_delay().is_some());
        assert!(p.next_delay().is_none());
        assert!(p.next_delay().is_none());

        p.reset();
        assert!(p.next_delay().is_some());
    }

    #[test]
    fn test_auto_reconnect_disabled() {
        let opts = ConnectionOptions::default().with_auto_reconnect(false);
        let mut p = ReconnectPolicy::from_options(&opts);
        assert_eq!(p.max_attempts(), Some(0));
        assert!(p.next_delay().is_none());
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let mut p = policy(None).with_jitter(Duration::ZERO, Duration::ZERO);
        assert_eq!(p.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(p.next_delay(), Some(Duration::from_secs(2)));
        p.set_server_advised(Duration::from_millis(750));
        assert_eq!(p.next_delay(), Some(Duration::from_millis(750)));
    }
}
