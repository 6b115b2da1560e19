//! Detection requests.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::types::VotingStrategy;

/// One hallucination-detection call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRequest {
    /// The agent output under review
    pub agent_output: String,

    /// What the agent was asked
    #[serde(default)]
    pub agent_input: Option<String>,

    /// Grounding material the agent had access to
    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub strategy: VotingStrategy,

    /// Valid votes needed for a non-degraded consensus
    #[serde(default = "default_min_models")]
    pub min_models: usize,

    /// Vote-share threshold (Threshold strategy) and acceptance bar (Adaptive)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Caller-supplied complexity in [0, 1], overriding the estimator
    #[serde(default)]
    pub context_complexity: Option<f64>,

    /// Maximum estimated spend in USD for this call
    #[serde(default)]
    pub budget_constraint: Option<f64>,
}

fn default_min_models() -> usize {
    2
}

fn default_confidence_threshold() -> f64 {
    0.7
}

impl DetectionRequest {
    /// A request with default strategy and constraints.
    pub fn new(agent_output: impl Into<String>) -> Self {
        Self {
            agent_output: agent_output.into(),
            agent_input: None,
            context: None,
            strategy: VotingStrategy::default(),
            min_models: default_min_models(),
            confidence_threshold: default_confidence_threshold(),
            context_complexity: None,
            budget_constraint: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.agent_input = Some(input.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_strategy(mut self, strategy: VotingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_min_models(mut self, min_models: usize) -> Self {
        self.min_models = min_models;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.context_complexity = Some(complexity);
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget_constraint = Some(budget);
        self
    }

    /// Check request parameters. Does not look at the registry.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.min_models == 0 {
            return Err(ConfigurationError::InvalidRequest(
                "min_models must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigurationError::InvalidRequest(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if let Some(complexity) = self.context_complexity {
            if !(0.0..=1.0).contains(&complexity) {
                return Err(ConfigurationError::InvalidRequest(format!(
                    "context_complexity {} outside [0, 1]",
                    complexity
                )));
            }
        }
        if let Some(budget) = self.budget_constraint {
            if !budget.is_finite() || budget < 0.0 {
                return Err(ConfigurationError::InvalidRequest(format!(
                    "budget_constraint {} must be a finite value >= 0",
                    budget
                )));
            }
        }
        Ok(())
    }
}
