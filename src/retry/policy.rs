//! Declarative retry policy and its time budget.

use std::collections::BTreeSet;
use std::time::Duration;

use super::RetryError;

/// Default number of attempts per command.
pub const DEFAULT_ATTEMPTS: u32 = 3;
/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
/// Default growth factor applied to the delay after each retry.
pub const DEFAULT_DELAY_MULTIPLIER: f64 = 2.0;
/// Default time allowed for a single attempt, dial included.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);
/// Exit codes that commonly mean "node still booting" on fresh hosts.
pub const DEFAULT_RETRYABLE_EXIT_CODES: [i32; 2] = [1, 255];
/// Message fragments that mark a transient failure.
pub const DEFAULT_RETRYABLE_MESSAGES: [&str; 9] = [
    "connection refused",
    "connection reset",
    "connection closed",
    "broken pipe",
    "no route to host",
    "network is unreachable",
    "operation timed out",
    "timed out",
    "exited without exit status",
];
/// Message fragments that mark a permanent failure. Checked first.
pub const DEFAULT_NON_RETRYABLE_MESSAGES: [&str; 5] = [
    "permission denied",
    "host key verification failed",
    "invalid argument",
    "authentication failed",
    "publickey combination invalid",
];

/// Retry settings for one orchestrated call.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of executor invocations (at least one).
    pub attempts: u32,
    /// Sleep before the first retry.
    pub base_delay: Duration,
    /// Factor applied to the sleep after every retry (at least `1.0`).
    pub delay_multiplier: f64,
    /// Remote exit codes treated as transient.
    pub retryable_exit_codes: BTreeSet<i32>,
    /// Case-insensitive fragments marking an error as transient.
    pub retryable_messages: Vec<String>,
    /// Case-insensitive fragments marking an error as permanent.
    pub non_retryable_messages: Vec<String>,
    /// Time allowed for one attempt, including session acquisition.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            delay_multiplier: DEFAULT_DELAY_MULTIPLIER,
            retryable_exit_codes: DEFAULT_RETRYABLE_EXIT_CODES.into_iter().collect(),
            retryable_messages: DEFAULT_RETRYABLE_MESSAGES
                .iter()
                .map(|text| (*text).to_owned())
                .collect(),
            non_retryable_messages: DEFAULT_NON_RETRYABLE_MESSAGES
                .iter()
                .map(|text| (*text).to_owned())
                .collect(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Overrides the attempt count.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Overrides the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Overrides the delay multiplier.
    #[must_use]
    pub const fn with_delay_multiplier(mut self, multiplier: f64) -> Self {
        self.delay_multiplier = multiplier;
        self
    }

    /// Overrides the per-attempt timeout.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Replaces the retryable exit-code whitelist.
    #[must_use]
    pub fn with_retryable_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.retryable_exit_codes = codes.into_iter().collect();
        self
    }

    /// Checks the structural constraints on the policy.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::InvalidPolicy`] when `attempts` is zero, the
    /// multiplier is below one or not finite, or the attempt timeout is zero.
    pub fn validate(&self) -> Result<(), RetryError> {
        if self.attempts == 0 {
            return Err(RetryError::InvalidPolicy {
                reason: String::from("attempts must be at least 1"),
            });
        }
        if !self.delay_multiplier.is_finite() || self.delay_multiplier < 1.0 {
            return Err(RetryError::InvalidPolicy {
                reason: format!(
                    "delay multiplier must be finite and >= 1.0, got {}",
                    self.delay_multiplier
                ),
            });
        }
        if self.attempt_timeout.is_zero() {
            return Err(RetryError::InvalidPolicy {
                reason: String::from("attempt timeout must be positive"),
            });
        }
        Ok(())
    }

    /// Returns the sleep that follows `delay` in the backoff series.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        reason = "backoff growth is a fractional multiplier by definition"
    )]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.delay_multiplier)
            .unwrap_or(Duration::MAX)
    }

    /// The sleeps taken between attempts, in order (`attempts - 1` entries).
    #[must_use]
    pub fn backoff_series(&self) -> Vec<Duration> {
        let mut series = Vec::new();
        let mut delay = self.base_delay;
        for _ in 1..self.attempts {
            series.push(delay);
            delay = self.next_delay(delay);
        }
        series
    }

    /// Total wall-clock budget: every backoff sleep plus one attempt timeout
    /// per attempt.
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        let sleeps = self
            .backoff_series()
            .into_iter()
            .fold(Duration::ZERO, Duration::saturating_add);
        let attempts = self
            .attempt_timeout
            .checked_mul(self.attempts)
            .unwrap_or(Duration::MAX);
        sleeps.saturating_add(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_whitelist_booting_exit_codes() {
        let policy = RetryPolicy::default();
        assert!(policy.retryable_exit_codes.contains(&1));
        assert!(policy.retryable_exit_codes.contains(&255));
        assert_eq!(policy.retryable_exit_codes.len(), 2);
    }

    #[rstest]
    fn backoff_series_grows_geometrically() {
        let policy = RetryPolicy::default()
            .with_attempts(4)
            .with_base_delay(Duration::from_secs(1))
            .with_delay_multiplier(3.0);
        assert_eq!(
            policy.backoff_series(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(9)
            ]
        );
    }

    #[rstest]
    fn budget_sums_sleeps_and_attempt_timeouts() {
        let policy = RetryPolicy::default()
            .with_attempts(3)
            .with_base_delay(Duration::from_secs(2))
            .with_delay_multiplier(2.0)
            .with_attempt_timeout(Duration::from_secs(10));
        assert_eq!(policy.total_budget(), Duration::from_secs(2 + 4 + 30));
    }

    #[rstest]
    fn single_attempt_has_no_sleeps() {
        let policy = RetryPolicy::default().with_attempts(1);
        assert!(policy.backoff_series().is_empty());
        assert_eq!(policy.total_budget(), DEFAULT_ATTEMPT_TIMEOUT);
    }

    #[rstest]
    #[case(RetryPolicy::default().with_attempts(0))]
    #[case(RetryPolicy::default().with_delay_multiplier(0.5))]
    #[case(RetryPolicy::default().with_delay_multiplier(f64::NAN))]
    #[case(RetryPolicy::default().with_attempt_timeout(Duration::ZERO))]
    fn validate_rejects_malformed_policies(#[case] policy: RetryPolicy) {
        assert!(matches!(
            policy.validate(),
            Err(RetryError::InvalidPolicy { .. })
        ));
    }

    #[rstest]
    fn next_delay_saturates_instead_of_panicking() {
        let policy = RetryPolicy::default().with_delay_multiplier(10.0);
        assert_eq!(policy.next_delay(Duration::MAX), Duration::MAX);
    }
}
