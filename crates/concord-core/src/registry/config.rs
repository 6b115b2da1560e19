//! Per-model judge configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigurationError;
use crate::types::{ModelName, Provider};

/// Configuration for one judge model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identity (one live config per name)
    pub name: ModelName,

    /// Hosting provider, routed to a judge client
    pub provider: Provider,

    /// Disabled models keep their configuration but never vote
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Voting weight, must be > 0
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// USD per 1K tokens
    #[serde(default)]
    pub cost_per_1k_tokens: f64,

    /// Maximum tokens per judge answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (0.0 for deterministic)
    #[serde(default)]
    pub temperature: f32,

    /// Per-call timeout
    #[serde(default = "default_timeout", with = "crate::duration")]
    pub timeout: Duration,
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ModelConfig {
    /// Create a config with defaults and the model's usual provider.
    pub fn new(name: ModelName) -> Self {
        Self {
            name,
            provider: name.default_provider(),
            enabled: true,
            weight: default_weight(),
            cost_per_1k_tokens: 0.0,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout: default_timeout(),
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_cost(mut self, cost_per_1k_tokens: f64) -> Self {
        self.cost_per_1k_tokens = cost_per_1k_tokens;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Cost of a call that used `tokens` tokens.
    pub fn cost_for_tokens(&self, tokens: u32) -> f64 {
        (tokens as f64 / 1000.0) * self.cost_per_1k_tokens
    }

    /// Upper-bound cost of a single call, used for budget planning.
    pub fn estimated_call_cost(&self) -> f64 {
        self.cost_for_tokens(self.max_tokens)
    }

    /// Check the invariants every live config must hold.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidModelConfig {
            model: self.name.to_string(),
            reason: reason.to_string(),
        };

        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(invalid("weight must be a finite value > 0"));
        }
        if !self.cost_per_1k_tokens.is_finite() || self.cost_per_1k_tokens < 0.0 {
            return Err(invalid("cost_per_1k_tokens must be a finite value >= 0"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature must be within [0, 2]"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be non-zero"));
        }
        Ok(())
    }
}
