//! Engine configuration.
//!
//! Every section has defaults, so a config file only needs the values it
//! changes:
//!
//! ```yaml
//! dispatch_timeout: 45s
//! cascade:
//!   early_stop_confidence: 0.9
//! selector:
//!   initial_epsilon: 0.2
//!   max_models: 4
//! circuit_breaker:
//!   failure_threshold: 5
//!   recovery_timeout: 1m
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::CircuitBreakerConfig;

/// Errors while loading engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid engine config: {0}")]
    Invalid(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on one detection's dispatch phase
    #[serde(with = "concord_core::duration")]
    pub dispatch_timeout: Duration,

    pub cascade: CascadeConfig,

    pub selector: SelectorConfig,

    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(60),
            cascade: CascadeConfig::default(),
            selector: SelectorConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Early-stop rules for cascading dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Stop as soon as one judge is more confident than this
    pub early_stop_confidence: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            early_stop_confidence: 0.95,
        }
    }
}

/// Epsilon-greedy selector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Starting exploration probability
    pub initial_epsilon: f64,

    /// Multiplier applied every `decay_interval` selections
    pub epsilon_decay: f64,

    /// Exploration never decays below this
    pub min_epsilon: f64,

    pub decay_interval: u64,

    /// EMA weight of a new observation (`score = (1 - lr) * score + lr * observed`)
    pub learning_rate: f64,

    /// Score assumed for models with no history
    pub prior_score: f64,

    /// Largest subset the selector will pick
    pub max_models: usize,

    /// Below this complexity the selector stops at `min_models`
    pub low_complexity_threshold: f64,

    pub history_capacity: usize,

    /// Query the remaining models when the adaptive consensus is below the
    /// request's confidence threshold
    pub escalate_below_threshold: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            initial_epsilon: 0.1,
            epsilon_decay: 0.99,
            min_epsilon: 0.05,
            decay_interval: 100,
            learning_rate: 0.1,
            prior_score: 0.8,
            max_models: 3,
            low_complexity_threshold: 0.3,
            history_capacity: 1000,
            escalate_below_threshold: true,
        }
    }
}

impl EngineConfig {
    /// Parse a config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be within [0, 1], got {}", name, value)))
            }
        };

        if self.dispatch_timeout.is_zero() {
            return Err(ConfigError::Invalid("dispatch_timeout must be non-zero".to_string()));
        }
        unit("cascade.early_stop_confidence", self.cascade.early_stop_confidence)?;

        let s = &self.selector;
        unit("selector.initial_epsilon", s.initial_epsilon)?;
        unit("selector.epsilon_decay", s.epsilon_decay)?;
        unit("selector.min_epsilon", s.min_epsilon)?;
        unit("selector.learning_rate", s.learning_rate)?;
        unit("selector.prior_score", s.prior_score)?;
        unit("selector.low_complexity_threshold", s.low_complexity_threshold)?;
        if s.decay_interval == 0 {
            return Err(ConfigError::Invalid("selector.decay_interval must be > 0".to_string()));
        }
        if s.max_models == 0 {
            return Err(ConfigError::Invalid("selector.max_models must be > 0".to_string()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.cascade.early_stop_confidence, 0.95);
        assert_eq!(config.selector.prior_score, 0.8);
        assert_eq!(config.selector.min_epsilon, 0.05);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
dispatch_timeout: 45s
selector:
  initial_epsilon: 0.2
  max_models: 4
circuit_breaker:
  recovery_timeout: 1m
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.dispatch_timeout, Duration::from_secs(45));
        assert_eq!(config.selector.initial_epsilon, 0.2);
        assert_eq!(config.selector.max_models, 4);
        assert_eq!(config.selector.learning_rate, 0.1);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let yaml = r#"
selector:
  initial_epsilon: 1.5
"#;
        assert!(matches!(
            EngineConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));

        let yaml = "dispatch_timeout: 0s\n";
        assert!(EngineConfig::from_yaml(yaml).is_err());
    }
}
