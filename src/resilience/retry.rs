// ABOUTME: Bounded retry with exponential backoff.
// ABOUTME: Policy-agnostic: every failure is retried until the attempt budget runs out.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Must be at least 1.
    pub max_attempts: u32,

    /// Sleep before the second attempt.
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Factor applied to the sleep after every failed attempt. Must be at least 1.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
        }
    }

    /// A single, unretried attempt.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Check the policy's invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be a finite number >= 1 (got {})",
                self.backoff_multiplier
            ));
        }
        Ok(())
    }

    /// The sleeps taken between attempts: `max_attempts - 1` values forming a
    /// geometric sequence that starts at `initial_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut delay = self.initial_delay;
        (1..self.max_attempts.max(1)).map(move |_| {
            let current = delay;
            delay = self.next_delay(delay);
            current
        })
    }

    /// Upper bound on time spent sleeping if every attempt fails.
    pub fn total_delay(&self) -> Duration {
        self.delays().sum()
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5), 2.0)
    }
}

/// Every attempt failed. Carries the last failure and how many attempts were made.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed after {} attempt(s): {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Exhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_error)
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// The closure receives the 1-based attempt number. Between failed attempts the
/// engine sleeps, starting at `initial_delay` and multiplying by
/// `backoff_multiplier` each time. One INFO line is logged per attempt and per
/// outcome.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        tracing::info!(
            operation,
            attempt,
            max_attempts,
            "{operation}: attempt {attempt}/{max_attempts}"
        );

        match attempt_fn(attempt).await {
            Ok(value) => {
                tracing::info!(
                    operation,
                    attempt,
                    outcome = "success",
                    "{operation}: attempt {attempt} succeeded"
                );
                return Ok(value);
            }
            Err(error) if attempt >= max_attempts => {
                tracing::info!(
                    operation,
                    attempt,
                    outcome = "exhausted",
                    error = %error,
                    "{operation}: attempt {attempt} failed, no attempts left: {error}"
                );
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }
            Err(error) => {
                tracing::info!(
                    operation,
                    attempt,
                    outcome = "retry",
                    error = %error,
                    delay_secs = delay.as_secs_f64(),
                    "{operation}: attempt {attempt} failed, retrying in {delay:?}: {error}"
                );
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
                attempt += 1;
            }
        }
    }
}
