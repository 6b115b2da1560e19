//! Circuit breaker to keep failing judges out of the hot path.
//!
//! When a judge fails repeatedly its circuit opens and the dispatcher
//! records an immediate `CircuitOpen` result instead of calling it.

use concord_core::ModelName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery
    #[serde(with = "concord_core::duration")]
    pub recovery_timeout: Duration,

    /// Successes needed to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, calls are skipped
    Open { opened_at: Instant },

    /// Trial calls allowed to test recovery
    HalfOpen { successes: u32 },
}

/// Per-model circuit breaker.
///
/// Each judge has its own circuit so one flaky provider does not take
/// the rest of the ensemble down with it.
pub struct CircuitBreaker {
    states: RwLock<HashMap<ModelName, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls to `model` should be skipped.
    pub fn is_open(&self, model: ModelName) -> bool {
        let states = self.states.read();
        match states.get(&model) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(model);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Record a successful judge call.
    pub fn record_success(&self, model: ModelName) {
        let mut states = self.states.write();
        match states.get(&model).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(model, CircuitState::Closed { failures: 0 });
                    tracing::info!(model = %model, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        model,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(model, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a failed judge call.
    pub fn record_failure(&self, model: ModelName) {
        let mut states = self.states.write();
        let failures = match states.get(&model) {
            Some(CircuitState::Closed { failures }) => *failures + 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    model,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(model = %model, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
            None => 1,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                model,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(model = %model, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(model, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, model: ModelName) {
        let mut states = self.states.write();
        if matches!(states.get(&model), Some(CircuitState::Open { .. })) {
            states.insert(model, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(model = %model, "Circuit half-open, allowing trial calls");
        }
    }

    /// Current state of a circuit.
    pub fn state(&self, model: ModelName) -> CircuitState {
        self.states
            .read()
            .get(&model)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Models whose circuit is currently open.
    pub fn open_circuits(&self) -> Vec<ModelName> {
        let mut open: Vec<ModelName> = self
            .states
            .read()
            .iter()
            .filter(|(_, s)| matches!(s, CircuitState::Open { .. }))
            .map(|(m, _)| *m)
            .collect();
        open.sort();
        open
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open(ModelName::Gpt4o));
        assert_eq!(cb.state(ModelName::Gpt4o), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        cb.record_failure(ModelName::Gpt4o);
        assert!(!cb.is_open(ModelName::Gpt4o));

        cb.record_failure(ModelName::Gpt4o);
        assert!(cb.is_open(ModelName::Gpt4o));
        assert_eq!(cb.open_circuits(), vec![ModelName::Gpt4o]);
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::default();

        cb.record_failure(ModelName::GeminiPro);
        cb.record_failure(ModelName::GeminiPro);
        cb.record_success(ModelName::GeminiPro);

        cb.record_failure(ModelName::GeminiPro);
        cb.record_failure(ModelName::GeminiPro);
        assert!(!cb.is_open(ModelName::GeminiPro));
    }

    #[test]
    fn test_models_are_independent() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });

        cb.record_failure(ModelName::ClaudeHaiku);
        assert!(cb.is_open(ModelName::ClaudeHaiku));
        assert!(!cb.is_open(ModelName::ClaudeSonnet));
    }

    #[test]
    fn test_recovery_through_half_open() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::ZERO,
            success_threshold: 1,
        });

        cb.record_failure(ModelName::MistralLarge);
        // Zero recovery timeout: the next check moves straight to half-open
        assert!(!cb.is_open(ModelName::MistralLarge));
        assert_eq!(
            cb.state(ModelName::MistralLarge),
            CircuitState::HalfOpen { successes: 0 }
        );

        cb.record_success(ModelName::MistralLarge);
        assert_eq!(
            cb.state(ModelName::MistralLarge),
            CircuitState::Closed { failures: 0 }
        );
    }
}
