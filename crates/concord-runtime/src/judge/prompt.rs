//! Detection prompt rendering and judge answer parsing.
//!
//! Judges produce a strict JSON verdict. Anything else is a
//! `MalformedResponse`: we never "best-effort parse" a verdict.

use concord_core::{DetectionRequest, ModelCallError};
use serde::Deserialize;

use super::JudgeVerdict;

/// System prompt shared by every judge.
pub const JUDGE_SYSTEM_PROMPT: &str = r#"
You are a hallucination judge reviewing the output of an AI agent.

Your only task is to decide whether the agent output contains claims that are
factually wrong or not supported by the provided input and context.

## Rules
1. Judge factual grounding only, not style, tone or helpfulness
2. Treat claims that contradict the context as hallucinations
3. Treat specific facts (names, dates, numbers, citations) that cannot be
   verified from the context or common knowledge as hallucinations
4. If the output makes no factual claims, it is not a hallucination
5. Lower your confidence when you are unsure; do not guess

## Output Format (JSON only, no prose around it)
{
  "is_hallucination": true | false,
  "confidence": 0.0-1.0,
  "rationale": "one or two sentences naming the ungrounded claim, if any"
}
"#;

/// The material a judge is asked to assess.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionPrompt {
    pub agent_output: String,
    pub agent_input: Option<String>,
    pub context: Option<String>,
}

impl DetectionPrompt {
    pub fn new(agent_output: impl Into<String>) -> Self {
        Self {
            agent_output: agent_output.into(),
            agent_input: None,
            context: None,
        }
    }

    pub fn from_request(request: &DetectionRequest) -> Self {
        Self {
            agent_output: request.agent_output.clone(),
            agent_input: request.agent_input.clone(),
            context: request.context.clone(),
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        JUDGE_SYSTEM_PROMPT
    }

    /// Render the user message sent to the judge.
    pub fn user_prompt(&self) -> String {
        let mut prompt = String::new();
        if let Some(input) = &self.agent_input {
            prompt.push_str("## Agent Input\n");
            prompt.push_str(input);
            prompt.push_str("\n\n");
        }
        if let Some(context) = &self.context {
            prompt.push_str("## Context\n");
            prompt.push_str(context);
            prompt.push_str("\n\n");
        }
        prompt.push_str("## Agent Output\n");
        prompt.push_str(&self.agent_output);
        prompt.push_str("\n\nRespond with the JSON verdict only.");
        prompt
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    is_hallucination: bool,
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

/// Parse a judge's JSON verdict.
///
/// Accepts a JSON object optionally wrapped in prose or a code fence, as
/// long as exactly the outermost `{...}` parses. `tokens_used` is attached
/// as reported by the transport.
pub fn parse_verdict(text: &str, tokens_used: u32) -> Result<JudgeVerdict, ModelCallError> {
    let malformed = |message: String| ModelCallError::MalformedResponse { message };

    let start = text
        .find('{')
        .ok_or_else(|| malformed("no JSON object in judge response".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| malformed("unterminated JSON object in judge response".to_string()))?;

    let raw: RawVerdict =
        serde_json::from_str(&text[start..=end]).map_err(|e| malformed(e.to_string()))?;

    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(malformed(format!(
            "confidence {} outside [0, 1]",
            raw.confidence
        )));
    }

    Ok(JudgeVerdict {
        is_hallucination: raw.is_hallucination,
        confidence: raw.confidence,
        rationale: raw.rationale,
        tokens_used,
    })
}
