//! Resilience patterns for judge dispatch.
//!
//! Timeouts are enforced by the dispatcher itself; this module holds the
//! per-model circuit breaker.

mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
