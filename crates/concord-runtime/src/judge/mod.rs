//! Judge client abstractions.
//!
//! A judge is an external LLM classifier asked one question: is this agent
//! output factually ungrounded? [`JudgeClient`] is the only place where
//! judge calls are made; the dispatcher never talks to a transport directly.

use async_trait::async_trait;
use concord_core::{ModelCallError, ModelConfig};

mod prompt;
mod router;

#[cfg(feature = "anthropic")]
mod anthropic;

pub use prompt::{parse_verdict, DetectionPrompt, JUDGE_SYSTEM_PROMPT};
pub use router::JudgeRouter;

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicJudge, ANTHROPIC_API_KEY_ENV};

/// A judge's answer to one detection prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    /// Whether the judge considers the output hallucinated
    pub is_hallucination: bool,

    /// Judge confidence in [0, 1]
    pub confidence: f64,

    /// Short explanation from the judge
    pub rationale: String,

    /// Prompt plus completion tokens billed for the call
    pub tokens_used: u32,
}

/// Uniform interface to query one external judge.
///
/// # Contract
/// - Safe to call concurrently from many in-flight detections
/// - Should honour `config.timeout`; the dispatcher also enforces it, so a
///   slow judge surfaces as [`ModelCallError::Timeout`]
/// - Every failure is returned as a [`ModelCallError`], never a panic
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Ask the judge described by `config` about `prompt`.
    async fn query(
        &self,
        config: &ModelConfig,
        prompt: &DetectionPrompt,
    ) -> Result<JudgeVerdict, ModelCallError>;

    /// Client name for logs.
    fn name(&self) -> &str;
}
