// ABOUTME: Resilience primitives wrapped around every external call.
// ABOUTME: Exports the retry engine and the persistent circuit breaker.

mod breaker;
mod retry;

pub use breaker::{BreakerConfig, BreakerError, CircuitBreaker, CircuitRecord, CircuitState};
pub use retry::{Exhausted, RetryPolicy, retry};
