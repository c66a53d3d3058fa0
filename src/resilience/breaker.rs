// ABOUTME: Persistent circuit breaker keyed by dependency name.
// ABOUTME: Fails fast while a dependency is known to be down and probes it after a recovery timeout.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{self, StateStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Healthy: calls go through.
    #[default]
    Closed,
    /// Tripped: calls are rejected until the recovery timeout elapses.
    Open,
    /// Recovery timeout elapsed: one probe call is allowed through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Durable breaker state, one record per dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub state: CircuitState,
}

impl CircuitRecord {
    /// Time since the last recorded failure, or `None` if there is none.
    fn since_last_failure(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_failure
            .map(|at| (now - at).to_std().unwrap_or(Duration::ZERO))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open before a probe is allowed.
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    Open { name: String, retry_after: Duration },
    /// The operation ran and failed.
    Inner(E),
    /// Breaker state could not be loaded.
    Store(StoreError),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open { name, retry_after } => {
                write!(f, "circuit {name} is open; retry after {retry_after:?}")
            }
            BreakerError::Inner(e) => write!(f, "{e}"),
            BreakerError::Store(e) => write!(f, "circuit state unavailable: {e}"),
        }
    }
}

/// A circuit breaker guarding one external dependency.
///
/// State lives in the [`StateStore`] under `breakers/<name>.json`, so a
/// dependency that was failing in the previous run is still treated as down
/// in the next one.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    store: Arc<dyn StateStore>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            name: name.into(),
            config,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Store key holding this breaker's record.
    pub fn key(&self) -> String {
        format!("breakers/{}.json", self.name)
    }

    /// Current persisted record (CLOSED with no failures if none exists).
    pub fn record(&self) -> Result<CircuitRecord, StoreError> {
        Ok(store::load(self.store.as_ref(), &self.key())?.unwrap_or_default())
    }

    pub fn state(&self) -> Result<CircuitState, StoreError> {
        self.record().map(|r| r.state)
    }

    /// Force the breaker back to CLOSED.
    pub fn reset(&self) -> Result<(), StoreError> {
        store::save(self.store.as_ref(), &self.key(), &CircuitRecord::default())
    }

    /// Invoke `operation` through the breaker.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut record = self.record().map_err(BreakerError::Store)?;

        if record.state == CircuitState::Open {
            let elapsed = record.since_last_failure(Utc::now());
            match elapsed {
                Some(elapsed) if elapsed < self.config.recovery_timeout => {
                    tracing::debug!(
                        breaker = %self.name,
                        failures = record.failure_count,
                        "circuit {} open, failing fast",
                        self.name
                    );
                    return Err(BreakerError::Open {
                        name: self.name.clone(),
                        retry_after: self.config.recovery_timeout - elapsed,
                    });
                }
                _ => {
                    record.state = CircuitState::HalfOpen;
                    self.persist(&record);
                    tracing::info!(
                        breaker = %self.name,
                        "circuit {} half-open, probing dependency",
                        self.name
                    );
                }
            }
        }

        match operation().await {
            Ok(value) => {
                if record != CircuitRecord::default() {
                    if record.state == CircuitState::HalfOpen {
                        tracing::info!(breaker = %self.name, "circuit {} closed after successful probe", self.name);
                    }
                    self.persist(&CircuitRecord::default());
                }
                Ok(value)
            }
            Err(error) => {
                self.on_failure(record);
                Err(BreakerError::Inner(error))
            }
        }
    }

    fn on_failure(&self, mut record: CircuitRecord) {
        record.last_failure = Some(Utc::now());

        match record.state {
            CircuitState::HalfOpen => {
                // The recovery timer restarts from this failure; the count is kept
                record.state = CircuitState::Open;
                tracing::warn!(
                    breaker = %self.name,
                    failures = record.failure_count,
                    "circuit {} probe failed, reopening",
                    self.name
                );
            }
            CircuitState::Closed | CircuitState::Open => {
                record.failure_count = record.failure_count.saturating_add(1);
                if record.failure_count >= self.config.failure_threshold {
                    record.state = CircuitState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = record.failure_count,
                        "circuit {} opened after {} consecutive failures",
                        self.name,
                        record.failure_count
                    );
                }
            }
        }

        self.persist(&record);
    }

    /// Save the record. A failed save must not mask the operation's own result.
    fn persist(&self, record: &CircuitRecord) {
        if let Err(e) = store::save(self.store.as_ref(), &self.key(), record) {
            tracing::warn!(breaker = %self.name, "failed to persist circuit state: {e}");
        }
    }
}
