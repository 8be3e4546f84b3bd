//! Retry Policy
//!
//! A bounded backoff state machine shared by every outbound HTTP client.
//! It only computes delays; sleeping is left to the caller, so the same
//! policy drives async tasks, threads, or tests with paused time.
//!
//! Delay after the k-th failed attempt (1-based):
//!
//! ```text
//! base  = min(max_delay, initial_delay * multiplier^(k-1))
//! delay = base                          (Jitter::None)
//! delay = base/2 + uniform(0, base)     (Jitter::HalfPlusFull)
//! ```

use std::time::Duration;

use rand::Rng;

/// Randomization applied on top of the exponential base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Deterministic delays.
    #[default]
    None,
    /// `base/2 + uniform(0, base)`, spreading retries over `[0.5, 1.5] × base`.
    HalfPlusFull,
}

/// Configuration for a bounded retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first one.
    pub max_attempts: u32,
    /// Base delay after the first failure.
    pub initial_delay: Duration,
    /// Growth factor per failure.
    pub multiplier: f64,
    /// Cap on the base delay (before jitter).
    pub max_delay: Duration,
    /// Jitter mode.
    pub jitter: Jitter,
}

impl RetryPolicy {
    /// Directory feed policy: one attempt plus five retries after 2, 4, 8, 16
    /// and 32 seconds.
    #[must_use]
    pub const fn directory() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(32),
            jitter: Jitter::None,
        }
    }

    /// Quote API policy: five attempts, `min(30s, 500ms × 2^n)` with jitter.
    #[must_use]
    pub const fn quotes() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: Jitter::HalfPlusFull,
        }
    }

    /// Same policy with a different initial delay (tests use this to avoid
    /// real multi-second sleeps).
    #[must_use]
    pub const fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Same policy with a different attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Start a fresh backoff sequence.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.clone())
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again.
    RetryAfter(Duration),
    /// Attempt budget spent; surface a terminal error.
    GiveUp,
}

/// Per-operation backoff state: attempt counter plus delay computation.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    /// Create a new backoff sequence.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Record a failed attempt and decide what happens next.
    pub fn on_failure(&mut self) -> RetryDecision {
        self.on_failure_with_hint(None)
    }

    /// Record a failed attempt, preferring a server-provided delay.
    ///
    /// The hint still consumes an attempt, so a server that keeps throttling
    /// cannot hold the caller forever.
    pub fn on_failure_with_hint(&mut self, hint: Option<Duration>) -> RetryDecision {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(hint.unwrap_or_else(|| self.delay_for(self.failures)))
    }

    /// Failed attempts recorded so far.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn has_remaining_attempts(&self) -> bool {
        self.failures < self.policy.max_attempts
    }

    /// Reset after a success.
    pub const fn reset(&mut self) {
        self.failures = 0;
    }

    /// Base delay (no jitter) after the given 1-based failure count.
    #[must_use]
    pub fn base_delay(&self, failure: u32) -> Duration {
        let exponent = i32::try_from(failure.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.policy.initial_delay.as_secs_f64() * self.policy.multiplier.powi(exponent);
        let capped = scaled.min(self.policy.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.policy.max_delay
        }
    }

    fn delay_for(&self, failure: u32) -> Duration {
        let base = self.base_delay(failure);
        match self.policy.jitter {
            Jitter::None => base,
            Jitter::HalfPlusFull => {
                let base_ms = base.as_millis() as u64;
                let jitter_ms = rand::rng().random_range(0..=base_ms);
                Duration::from_millis(base_ms / 2 + jitter_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(policy: &RetryPolicy) -> Vec<RetryDecision> {
        let mut backoff = policy.backoff();
        (0..policy.max_attempts).map(|_| backoff.on_failure()).collect()
    }

    #[test]
    fn directory_policy_doubles_from_two_seconds() {
        let decisions = drain(&RetryPolicy::directory());
        let expected: Vec<RetryDecision> = [2, 4, 8, 16, 32]
            .into_iter()
            .map(|s| RetryDecision::RetryAfter(Duration::from_secs(s)))
            .chain(std::iter::once(RetryDecision::GiveUp))
            .collect();
        assert_eq!(decisions, expected);
    }

    #[test]
    fn quote_policy_base_is_capped_at_thirty_seconds() {
        let backoff = RetryPolicy::quotes().with_max_attempts(20).backoff();
        assert_eq!(backoff.base_delay(1), Duration::from_millis(500));
        assert_eq!(backoff.base_delay(2), Duration::from_millis(1_000));
        assert_eq!(backoff.base_delay(5), Duration::from_millis(8_000));
        assert_eq!(backoff.base_delay(7), Duration::from_secs(30));
        assert_eq!(backoff.base_delay(12), Duration::from_secs(30));
    }

    #[test]
    fn quote_jitter_stays_within_half_to_one_and_a_half_base() {
        for _ in 0..200 {
            let mut backoff = RetryPolicy::quotes().backoff();
            let RetryDecision::RetryAfter(delay) = backoff.on_failure() else {
                panic!("first failure must retry");
            };
            assert!(delay >= Duration::from_millis(250), "{delay:?} below 250ms");
            assert!(delay <= Duration::from_millis(750), "{delay:?} above 750ms");
        }
    }

    #[test]
    fn quote_policy_gives_up_after_five_attempts() {
        let decisions = drain(&RetryPolicy::quotes());
        assert_eq!(decisions.len(), 5);
        assert!(decisions[..4].iter().all(|d| matches!(d, RetryDecision::RetryAfter(_))));
        assert_eq!(decisions[4], RetryDecision::GiveUp);
    }

    #[test]
    fn hint_overrides_delay_but_consumes_attempt() {
        let mut backoff = RetryPolicy::quotes().backoff();
        assert_eq!(
            backoff.on_failure_with_hint(Some(Duration::from_secs(7))),
            RetryDecision::RetryAfter(Duration::from_secs(7))
        );
        assert_eq!(backoff.failures(), 1);
    }

    #[test]
    fn reset_restores_budget() {
        let mut backoff = RetryPolicy::quotes().with_max_attempts(2).backoff();
        let _ = backoff.on_failure();
        assert_eq!(backoff.on_failure(), RetryDecision::GiveUp);
        assert!(!backoff.has_remaining_attempts());

        backoff.reset();
        assert!(backoff.has_remaining_attempts());
        assert_eq!(backoff.failures(), 0);
    }
}
