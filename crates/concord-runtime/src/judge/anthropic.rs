//! Anthropic Claude judge.
//!
//! Serves `claude-sonnet` and `claude-haiku` from the registry. The API key
//! is held as a [`SecretString`] and only exposed when building the request
//! header.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use concord_core::{ModelCallError, ModelConfig, ModelName};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{parse_verdict, DetectionPrompt, JudgeClient, JudgeVerdict};

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Judge backed by the Anthropic Messages API.
pub struct AnthropicJudge {
    api_key: SecretString,
    base_url: String,
    client: reqwest::Client,
    max_retries: usize,
}

impl std::fmt::Debug for AnthropicJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicJudge")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl AnthropicJudge {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            max_retries: 2,
        }
    }

    /// Read the key from `ANTHROPIC_API_KEY`. The value is never logged.
    pub fn from_env() -> Result<Self, ModelCallError> {
        match std::env::var(ANTHROPIC_API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(ModelCallError::NotConfigured {
                message: format!("{} is not set", ANTHROPIC_API_KEY_ENV),
            }),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Retries applied to rate-limited calls.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// API model id for a registry model.
    fn api_model(model: ModelName) -> Result<&'static str, ModelCallError> {
        match model {
            ModelName::ClaudeSonnet => Ok("claude-sonnet-4-5"),
            ModelName::ClaudeHaiku => Ok("claude-haiku-4-5"),
            other => Err(ModelCallError::NotConfigured {
                message: format!("model '{}' is not served by Anthropic", other),
            }),
        }
    }

    async fn call_once(
        &self,
        config: &ModelConfig,
        prompt: &DetectionPrompt,
    ) -> Result<JudgeVerdict, ModelCallError> {
        let request = MessagesRequest {
            model: Self::api_model(config.name)?,
            max_tokens: config.max_tokens,
            system: prompt.system_prompt(),
            messages: vec![Message {
                role: "user",
                content: prompt.user_prompt(),
            }],
            temperature: config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelCallError::Timeout {
                        timeout_ms: config.timeout.as_millis() as u64,
                    }
                } else {
                    ModelCallError::Transport {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(ModelCallError::RateLimited { retry_after_ms });
        }

        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => status.to_string(),
            };
            return Err(ModelCallError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| ModelCallError::MalformedResponse {
                    message: e.to_string(),
                })?;

        let text = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        parse_verdict(&text, body.usage.input_tokens + body.usage.output_tokens)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'static str,
    max_tokens: u32,
    system: &'static str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl JudgeClient for AnthropicJudge {
    async fn query(
        &self,
        config: &ModelConfig,
        prompt: &DetectionPrompt,
    ) -> Result<JudgeVerdict, ModelCallError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_times(self.max_retries);

        (|| self.call_once(config, prompt))
            .retry(backoff)
            .when(|e| matches!(e, ModelCallError::RateLimited { .. }))
            .notify(|e, delay| {
                tracing::warn!(model = %config.name, error = %e, ?delay, "Retrying judge call");
            })
            .await
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
