//! Core types for hallucination consensus.
//!
//! Model and provider identifiers are closed sets: anything outside them is
//! rejected when a registry or request is parsed, never at dispatch time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::ConfigurationError;
use crate::registry::ModelConfig;

/// A judge model that can participate in the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelName {
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    ClaudeSonnet,
    ClaudeHaiku,
    GeminiPro,
    GeminiFlash,
    #[serde(rename = "llama-3-70b")]
    Llama3_70b,
    MistralLarge,
}

impl ModelName {
    /// Every known model, in declaration order.
    pub const ALL: [ModelName; 8] = [
        ModelName::Gpt4o,
        ModelName::Gpt4oMini,
        ModelName::ClaudeSonnet,
        ModelName::ClaudeHaiku,
        ModelName::GeminiPro,
        ModelName::GeminiFlash,
        ModelName::Llama3_70b,
        ModelName::MistralLarge,
    ];

    /// Stable identifier used in config files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::Gpt4o => "gpt-4o",
            ModelName::Gpt4oMini => "gpt-4o-mini",
            ModelName::ClaudeSonnet => "claude-sonnet",
            ModelName::ClaudeHaiku => "claude-haiku",
            ModelName::GeminiPro => "gemini-pro",
            ModelName::GeminiFlash => "gemini-flash",
            ModelName::Llama3_70b => "llama-3-70b",
            ModelName::MistralLarge => "mistral-large",
        }
    }

    /// The provider that serves this model unless configured otherwise.
    pub fn default_provider(&self) -> Provider {
        match self {
            ModelName::Gpt4o | ModelName::Gpt4oMini => Provider::OpenAi,
            ModelName::ClaudeSonnet | ModelName::ClaudeHaiku => Provider::Anthropic,
            ModelName::GeminiPro | ModelName::GeminiFlash => Provider::Google,
            ModelName::Llama3_70b => Provider::Meta,
            ModelName::MistralLarge => Provider::Mistral,
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelName::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigurationError::UnknownModel(s.to_string()))
    }
}

/// The organisation hosting a judge model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Meta,
    Mistral,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Meta => "meta",
            Provider::Mistral => "mistral",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            "meta" => Ok(Provider::Meta),
            "mistral" => Ok(Provider::Mistral),
            other => Err(ConfigurationError::InvalidRequest(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

/// How the ensemble reaches a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingStrategy {
    /// More than half of the valid votes decide.
    Majority,
    /// Votes weighted by configured weight and own confidence.
    #[default]
    Weighted,
    /// Hallucination only if every valid vote says so.
    Unanimous,
    /// Hallucination if the share of true votes reaches the threshold.
    Threshold,
    /// Cheapest-first sequential querying with early stopping.
    Cascading,
    /// Bandit-selected subset of models.
    Adaptive,
}

impl VotingStrategy {
    pub const ALL: [VotingStrategy; 6] = [
        VotingStrategy::Majority,
        VotingStrategy::Weighted,
        VotingStrategy::Unanimous,
        VotingStrategy::Threshold,
        VotingStrategy::Cascading,
        VotingStrategy::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VotingStrategy::Majority => "majority",
            VotingStrategy::Weighted => "weighted",
            VotingStrategy::Unanimous => "unanimous",
            VotingStrategy::Threshold => "threshold",
            VotingStrategy::Cascading => "cascading",
            VotingStrategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for VotingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VotingStrategy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VotingStrategy::ALL
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ConfigurationError::InvalidRequest(format!("unknown voting strategy '{}'", s))
            })
    }
}

/// Why a single judge query produced no usable verdict.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelCallError {
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Malformed judge response: {message}")]
    MalformedResponse { message: String },

    #[error("No judge client configured: {message}")]
    NotConfigured { message: String },

    #[error("Circuit open, call skipped")]
    CircuitOpen,
}

/// One judge's answer for one detection call.
///
/// When `error` is set the verdict fields are not authoritative and the
/// result does not vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    pub model: ModelName,
    pub provider: Provider,
    pub is_hallucination: bool,
    /// Judge confidence in [0, 1]
    pub confidence: f64,
    pub rationale: String,
    pub latency_ms: u64,
    pub tokens_used: u32,
    /// `tokens_used / 1000 * cost_per_1k_tokens`
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ModelCallError>,
}

impl ModelResult {
    /// Build a result from a successful judge call.
    pub fn success(
        config: &ModelConfig,
        is_hallucination: bool,
        confidence: f64,
        rationale: impl Into<String>,
        tokens_used: u32,
        latency_ms: u64,
    ) -> Self {
        Self {
            model: config.name,
            provider: config.provider,
            is_hallucination,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
            latency_ms,
            tokens_used,
            cost: config.cost_for_tokens(tokens_used),
            error: None,
        }
    }

    /// Build a result for a failed judge call.
    pub fn failure(config: &ModelConfig, error: ModelCallError, latency_ms: u64) -> Self {
        Self {
            model: config.name,
            provider: config.provider,
            is_hallucination: false,
            confidence: 0.0,
            rationale: error.to_string(),
            latency_ms,
            tokens_used: 0,
            cost: 0.0,
            error: Some(error),
        }
    }

    /// Whether this result takes part in voting.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Why a consensus is less trustworthy than its numbers suggest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Every dispatched call failed.
    NoValidVotes,
    /// Some calls succeeded, but fewer than the request required.
    InsufficientVotes { valid: usize, required: usize },
}

/// The engine's combined decision for one detection call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub is_hallucination: bool,
    pub confidence: f64,
    pub agreement_score: f64,
    /// Share of voting mass in favour of "hallucination" under the strategy
    pub hallucination_score: f64,
    pub model_results: Vec<ModelResult>,
    pub strategy: VotingStrategy,
    pub models_queried: usize,
    pub models_voted: usize,
    pub models_agreed: usize,
    pub rationale: String,
    pub total_latency_ms: u64,
    pub total_cost: f64,
    /// Estimated spend avoided compared with querying every enabled model
    pub cost_savings: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_models: Option<Vec<ModelName>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
    #[serde(default)]
    pub early_stopped: bool,
    pub detected_at: DateTime<Utc>,
}

impl ConsensusResult {
    /// True when the decision came from fewer valid votes than required.
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}
