//! Bounded retry of remote commands under a declarative policy.
//!
//! [`RetryOrchestrator::run_with_retry`] acquires a session, runs the command
//! and classifies any failure with [`classify`]. Retryable failures back off
//! geometrically; everything is bounded by a hard deadline computed once from
//! the policy ([`RetryPolicy::total_budget`]).

mod classify;
mod config;
mod error;
mod policy;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, error, warn};

use crate::deadline::deadline_after;
use crate::remote::{Connector, RemoteError, SessionCache, executor};

pub use classify::{Disposition, classify};
pub use config::RetryConfig;
pub use error::RetryError;
pub use policy::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_DELAY_MULTIPLIER,
    DEFAULT_NON_RETRYABLE_MESSAGES, DEFAULT_RETRYABLE_EXIT_CODES, DEFAULT_RETRYABLE_MESSAGES,
    RetryPolicy,
};

/// Runs remote commands with retries, sharing one session cache.
pub struct RetryOrchestrator<C: Connector> {
    cache: Arc<SessionCache<C>>,
}

impl<C: Connector> Clone for RetryOrchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<C: Connector> RetryOrchestrator<C> {
    /// Creates an orchestrator over an owned session cache.
    #[must_use]
    pub const fn new(cache: Arc<SessionCache<C>>) -> Self {
        Self { cache }
    }

    /// Returns the session cache, for shutdown via
    /// [`SessionCache::close_all`].
    #[must_use]
    pub fn cache(&self) -> &SessionCache<C> {
        &self.cache
    }

    /// Runs `command` on `host`, retrying transient failures.
    ///
    /// Makes at most `policy.attempts` executor invocations with at most
    /// `policy.attempts - 1` sleeps between them.
    ///
    /// # Errors
    ///
    /// - [`RetryError::InvalidPolicy`] before any attempt when the policy is
    ///   malformed;
    /// - [`RetryError::Fatal`] on the first non-retryable failure;
    /// - [`RetryError::Exhausted`] with the last error once attempts run out;
    /// - [`RetryError::DeadlineExceeded`] when the total budget elapses.
    pub async fn run_with_retry(
        &self,
        host: &str,
        command: &str,
        policy: &RetryPolicy,
    ) -> Result<String, RetryError> {
        policy.validate()?;
        let budget = policy.total_budget();
        let deadline = deadline_after(Instant::now(), budget);
        let mut delay = policy.base_delay;
        let mut attempt: u32 = 1;

        loop {
            let Ok(outcome) =
                timeout_at(deadline, self.attempt(host, command, policy.attempt_timeout)).await
            else {
                return Err(deadline_exceeded(host, budget, attempt));
            };
            let failure = match outcome {
                Ok(stdout) => {
                    debug!(host, attempt, "remote command succeeded");
                    return Ok(stdout);
                }
                Err(err) => err,
            };

            if failure.poisons_session()
                && timeout_at(deadline, self.cache.evict(host)).await.is_err()
            {
                return Err(deadline_exceeded(host, budget, attempt));
            }

            match classify(&failure, policy) {
                Disposition::Fatal => {
                    error!(host, attempt, error = %failure, "remote command failed fatally");
                    return Err(RetryError::Fatal {
                        host: host.to_owned(),
                        attempt,
                        source: failure,
                    });
                }
                Disposition::Retryable if attempt >= policy.attempts => {
                    error!(
                        host,
                        attempts = policy.attempts,
                        error = %failure,
                        "remote command exhausted retries"
                    );
                    return Err(RetryError::Exhausted {
                        host: host.to_owned(),
                        attempts: attempt,
                        source: failure,
                    });
                }
                Disposition::Retryable => {}
            }

            warn!(
                host,
                attempt,
                max_attempts = policy.attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "remote command failed; retrying"
            );
            if timeout_at(deadline, sleep(delay)).await.is_err() {
                return Err(deadline_exceeded(host, budget, attempt));
            }
            delay = policy.next_delay(delay);
            attempt += 1;
        }
    }

    /// Runs `command` on every host concurrently, one task per host.
    ///
    /// Results are returned in the order of `hosts`; one host failing never
    /// affects the others.
    pub async fn run_on_hosts<S: AsRef<str>>(
        &self,
        hosts: &[S],
        command: &str,
        policy: &RetryPolicy,
    ) -> Vec<(String, Result<String, RetryError>)> {
        let handles: Vec<_> = hosts
            .iter()
            .map(|host| {
                let owned_host = host.as_ref().to_owned();
                let orchestrator = self.clone();
                let owned_command = command.to_owned();
                let owned_policy = policy.clone();
                let task_host = owned_host.clone();
                let task = tokio::spawn(async move {
                    orchestrator
                        .run_with_retry(&task_host, &owned_command, &owned_policy)
                        .await
                });
                (owned_host, task)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            let result = handle.await.unwrap_or_else(|join_err| {
                Err(RetryError::Task {
                    host: host.clone(),
                    message: join_err.to_string(),
                })
            });
            results.push((host, result));
        }
        results
    }

    async fn attempt(
        &self,
        host: &str,
        command: &str,
        limit: Duration,
    ) -> Result<String, RemoteError> {
        let run = async {
            let session = self.cache.acquire(host).await?;
            executor::run(host, session.as_ref(), command)
                .await
                .into_result()
        };
        timeout(limit, run)
            .await
            .unwrap_or_else(|_| Err(RemoteError::timeout(host, limit)))
    }
}

fn deadline_exceeded(host: &str, budget: Duration, attempt: u32) -> RetryError {
    error!(host, attempt, ?budget, "retry deadline exceeded");
    RetryError::DeadlineExceeded {
        host: host.to_owned(),
        budget,
        attempt,
    }
}
