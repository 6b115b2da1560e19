//! Provider routing for judge clients.
//!
//! Each [`Provider`] maps to one client. The router is itself a
//! [`JudgeClient`], so the dispatcher does not care how many transports
//! stand behind it.
//!
//! ```ignore
//! let router = JudgeRouter::new()
//!     .route(Provider::Anthropic, Arc::new(AnthropicJudge::from_env()?));
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use concord_core::{ModelCallError, ModelConfig, Provider};

use super::{DetectionPrompt, JudgeClient, JudgeVerdict};

/// Routes each query to the client registered for the model's provider.
#[derive(Default)]
pub struct JudgeRouter {
    clients: BTreeMap<Provider, Arc<dyn JudgeClient>>,
}

impl JudgeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the client for a provider, replacing any previous one.
    pub fn register(&mut self, provider: Provider, client: Arc<dyn JudgeClient>) {
        self.clients.insert(provider, client);
    }

    /// Builder-style [`register`](Self::register).
    pub fn route(mut self, provider: Provider, client: Arc<dyn JudgeClient>) -> Self {
        self.register(provider, client);
        self
    }

    pub fn has_client(&self, provider: Provider) -> bool {
        self.clients.contains_key(&provider)
    }

    /// Providers with a registered client.
    pub fn providers(&self) -> Vec<Provider> {
        self.clients.keys().copied().collect()
    }
}

#[async_trait]
impl JudgeClient for JudgeRouter {
    async fn query(
        &self,
        config: &ModelConfig,
        prompt: &DetectionPrompt,
    ) -> Result<JudgeVerdict, ModelCallError> {
        match self.clients.get(&config.provider) {
            Some(client) => client.query(config, prompt).await,
            None => Err(ModelCallError::NotConfigured {
                message: format!(
                    "no judge client for provider '{}'. Available: {:?}",
                    config.provider,
                    self.providers()
                ),
            }),
        }
    }

    fn name(&self) -> &str {
        "router"
    }
}

impl std::fmt::Debug for JudgeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeRouter")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::ModelName;

    struct FixedJudge {
        verdict: bool,
    }

    #[async_trait]
    impl JudgeClient for FixedJudge {
        async fn query(
            &self,
            _config: &ModelConfig,
            _prompt: &DetectionPrompt,
        ) -> Result<JudgeVerdict, ModelCallError> {
            Ok(JudgeVerdict {
                is_hallucination: self.verdict,
                confidence: 0.9,
                rationale: "fixed".to_string(),
                tokens_used: 10,
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_routes_by_provider() {
        let router = JudgeRouter::new()
            .route(Provider::Anthropic, Arc::new(FixedJudge { verdict: true }))
            .route(Provider::OpenAi, Arc::new(FixedJudge { verdict: false }));

        let prompt = DetectionPrompt::new("text");
        let claude = router
            .query(&ModelConfig::new(ModelName::ClaudeSonnet), &prompt)
            .await
            .unwrap();
        let gpt = router
            .query(&ModelConfig::new(ModelName::Gpt4o), &prompt)
            .await
            .unwrap();

        assert!(claude.is_hallucination);
        assert!(!gpt.is_hallucination);
        assert_eq!(router.providers(), vec![Provider::OpenAi, Provider::Anthropic]);
    }

    #[tokio::test]
    async fn test_unrouted_provider_is_not_configured() {
        let router = JudgeRouter::new().route(Provider::Anthropic, Arc::new(FixedJudge { verdict: true }));
        let result = router
            .query(&ModelConfig::new(ModelName::GeminiPro), &DetectionPrompt::new("text"))
            .await;

        match result {
            Err(ModelCallError::NotConfigured { message }) => assert!(message.contains("google")),
            other => panic!("Expected NotConfigured, got {:?}", other),
        }
        assert!(!router.has_client(Provider::Google));
    }
}
