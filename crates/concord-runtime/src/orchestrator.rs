//! Judge dispatch: parallel fan-out and cheapest-first cascading.
//!
//! The dispatcher only executes a model set and returns raw results.
//! Choosing the set and reducing the verdicts is the engine's job.
//!
//! Every call goes through the circuit breaker and gets a timeout of
//! `min(model.timeout, time left until the dispatch deadline)`, so a slow
//! judge becomes a `Timeout` result instead of stalling the detection.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use concord_core::{ModelCallError, ModelConfig, ModelResult};

use crate::config::{CascadeConfig, EngineConfig};
use crate::judge::{DetectionPrompt, JudgeClient, JudgeVerdict};
use crate::resilience::CircuitBreaker;

/// Results of a cascading run.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    /// Results in query order
    pub results: Vec<ModelResult>,

    /// True when a confidence or agreement rule ended the cascade before
    /// every model was queried
    pub early_stopped: bool,
}

/// Executes judge queries with timeouts and circuit breaking.
pub struct Dispatcher {
    judge: Arc<dyn JudgeClient>,
    circuit_breaker: CircuitBreaker,
    dispatch_timeout: Duration,
    cascade: CascadeConfig,
}

impl Dispatcher {
    pub fn new(judge: Arc<dyn JudgeClient>, config: &EngineConfig) -> Self {
        Self {
            judge,
            circuit_breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            dispatch_timeout: config.dispatch_timeout,
            cascade: config.cascade.clone(),
        }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Query every model concurrently and wait for all of them to settle.
    ///
    /// One model's failure never affects its siblings. Results keep the
    /// order of `models`.
    pub async fn dispatch_parallel(
        &self,
        models: &[ModelConfig],
        prompt: &DetectionPrompt,
    ) -> Vec<ModelResult> {
        let deadline = Instant::now() + self.dispatch_timeout;
        join_all(
            models
                .iter()
                .map(|config| self.query_one(config, prompt, deadline)),
        )
        .await
    }

    /// Query models one at a time, cheapest first, stopping early when the
    /// answer is already clear.
    ///
    /// A budget only ends the cascade once `min_models` valid results exist.
    pub async fn dispatch_cascading(
        &self,
        models: &[ModelConfig],
        prompt: &DetectionPrompt,
        min_models: usize,
        budget: Option<f64>,
    ) -> CascadeOutcome {
        let deadline = Instant::now() + self.dispatch_timeout;
        let mut results: Vec<ModelResult> = Vec::with_capacity(models.len());
        let mut spent = 0.0;

        for config in cascade_order(models) {
            if Instant::now() >= deadline {
                tracing::warn!(
                    model = %config.name,
                    queried = results.len(),
                    "Dispatch deadline reached, cascade halted"
                );
                break;
            }

            let valid = results.iter().filter(|r| r.is_valid()).count();
            if let Some(budget) = budget {
                if valid >= min_models && spent + config.estimated_call_cost() > budget {
                    tracing::debug!(
                        model = %config.name,
                        spent,
                        budget,
                        "Budget exhausted, cascade halted"
                    );
                    break;
                }
            }

            let result = self.query_one(&config, prompt, deadline).await;
            spent += result.cost;
            results.push(result);

            if let Some(reason) = self.stop_reason(&results) {
                tracing::debug!(queried = results.len(), reason, "Cascade stopped early");
                return CascadeOutcome {
                    early_stopped: results.len() < models.len(),
                    results,
                };
            }
        }

        CascadeOutcome {
            results,
            early_stopped: false,
        }
    }

    fn stop_reason(&self, results: &[ModelResult]) -> Option<&'static str> {
        let latest = results.last()?;
        if latest.is_valid() && latest.confidence > self.cascade.early_stop_confidence {
            return Some("confident verdict");
        }

        let mut valid = results.iter().filter(|r| r.is_valid());
        let first = valid.next()?;
        let mut count = 1;
        for result in valid {
            if result.is_hallucination != first.is_hallucination {
                return None;
            }
            count += 1;
        }
        (count >= 2).then_some("unanimous so far")
    }

    /// Query one judge, converting every failure into an error result.
    async fn query_one(
        &self,
        config: &ModelConfig,
        prompt: &DetectionPrompt,
        deadline: Instant,
    ) -> ModelResult {
        if self.circuit_breaker.is_open(config.name) {
            tracing::warn!(model = %config.name, "Circuit open, skipping judge");
            return ModelResult::failure(config, ModelCallError::CircuitOpen, 0);
        }

        let timeout = config
            .timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.judge.query(config, prompt))
            .await
            .map(|answer| answer.and_then(checked_verdict));
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(verdict)) => {
                self.circuit_breaker.record_success(config.name);
                tracing::debug!(
                    model = %config.name,
                    is_hallucination = verdict.is_hallucination,
                    confidence = verdict.confidence,
                    latency_ms,
                    "Judge answered"
                );
                ModelResult::success(
                    config,
                    verdict.is_hallucination,
                    verdict.confidence,
                    verdict.rationale,
                    verdict.tokens_used,
                    latency_ms,
                )
            }
            Ok(Err(error)) => {
                tracing::warn!(model = %config.name, error = %error, "Judge call failed");
                self.circuit_breaker.record_failure(config.name);
                ModelResult::failure(config, error, latency_ms)
            }
            Err(_) => {
                tracing::warn!(model = %config.name, timeout = ?timeout, "Judge call timed out");
                self.circuit_breaker.record_failure(config.name);
                ModelResult::failure(
                    config,
                    ModelCallError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                    latency_ms,
                )
            }
        }
    }
}

/// Reject verdicts whose confidence is not a probability.
fn checked_verdict(verdict: JudgeVerdict) -> Result<JudgeVerdict, ModelCallError> {
    if verdict.confidence.is_finite() && (0.0..=1.0).contains(&verdict.confidence) {
        Ok(verdict)
    } else {
        Err(ModelCallError::MalformedResponse {
            message: format!("confidence {} outside [0, 1]", verdict.confidence),
        })
    }
}

/// Cascade order: ascending unit cost, ties broken by name.
pub fn cascade_order(models: &[ModelConfig]) -> Vec<ModelConfig> {
    let mut ordered = models.to_vec();
    ordered.sort_by(|a, b| {
        a.cost_per_1k_tokens
            .total_cmp(&b.cost_per_1k_tokens)
            .then_with(|| a.name.as_str().cmp(b.name.as_str()))
    });
    ordered
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("judge", &self.judge.name())
            .field("dispatch_timeout", &self.dispatch_timeout)
            .field("cascade", &self.cascade)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concord_core::ModelName;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::resilience::CircuitBreakerConfig;

    /// Answers from a per-model table; unlisted models fail.
    struct TableJudge {
        answers: HashMap<ModelName, (bool, f64, Duration)>,
        calls: AtomicUsize,
    }

    impl TableJudge {
        fn new(answers: &[(ModelName, bool, f64, u64)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(m, v, c, ms)| (*m, (*v, *c, Duration::from_millis(*ms))))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JudgeClient for TableJudge {
        async fn query(
            &self,
            config: &ModelConfig,
            _prompt: &DetectionPrompt,
        ) -> Result<JudgeVerdict, ModelCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (verdict, confidence, delay) =
                self.answers
                    .get(&config.name)
                    .copied()
                    .ok_or_else(|| ModelCallError::Transport {
                        message: "connection refused".to_string(),
                    })?;
            tokio::time::sleep(delay).await;
            Ok(JudgeVerdict {
                is_hallucination: verdict,
                confidence,
                rationale: String::new(),
                tokens_used: 200,
            })
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    fn models() -> Vec<ModelConfig> {
        vec![
            ModelConfig::new(ModelName::Gpt4o).with_cost(0.005),
            ModelConfig::new(ModelName::GeminiFlash).with_cost(0.0001),
            ModelConfig::new(ModelName::ClaudeHaiku).with_cost(0.0008),
        ]
    }

    fn dispatcher(judge: Arc<TableJudge>, config: EngineConfig) -> Dispatcher {
        Dispatcher::new(judge, &config)
    }

    #[test]
    fn test_cascade_order_by_cost_then_name() {
        let mut models = models();
        models.push(ModelConfig::new(ModelName::ClaudeSonnet).with_cost(0.0008));
        let order: Vec<ModelName> = cascade_order(&models).iter().map(|c| c.name).collect();
        assert_eq!(
            order,
            vec![
                ModelName::GeminiFlash,
                ModelName::ClaudeHaiku,
                ModelName::ClaudeSonnet,
                ModelName::Gpt4o
            ]
        );
    }

    #[tokio::test]
    async fn test_parallel_failure_does_not_abort_siblings() {
        let judge = Arc::new(TableJudge::new(&[
            (ModelName::Gpt4o, true, 0.9, 5),
            (ModelName::ClaudeHaiku, true, 0.8, 5),
        ]));
        let dispatcher = dispatcher(judge.clone(), EngineConfig::default());

        let results = dispatcher
            .dispatch_parallel(&models(), &DetectionPrompt::new("text"))
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_valid());
        assert!(matches!(
            results[1].error,
            Some(ModelCallError::Transport { .. })
        ));
        assert!(results[2].is_valid());
        assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_judge_times_out_individually() {
        let judge = Arc::new(TableJudge::new(&[
            (ModelName::Gpt4o, true, 0.9, 10),
            (ModelName::GeminiFlash, true, 0.9, 120_000),
            (ModelName::ClaudeHaiku, true, 0.9, 10),
        ]));
        let dispatcher = dispatcher(judge, EngineConfig::default());

        let results = dispatcher
            .dispatch_parallel(&models(), &DetectionPrompt::new("text"))
            .await;

        assert!(results[0].is_valid());
        assert_eq!(
            results[1].error,
            Some(ModelCallError::Timeout { timeout_ms: 30_000 })
        );
        assert!(results[2].is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_deadline_caps_model_timeout() {
        let judge = Arc::new(TableJudge::new(&[(ModelName::Gpt4o, true, 0.9, 20_000)]));
        let config = EngineConfig {
            dispatch_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let dispatcher = dispatcher(judge, config);

        let results = dispatcher
            .dispatch_parallel(&models()[..1], &DetectionPrompt::new("text"))
            .await;

        assert_eq!(
            results[0].error,
            Some(ModelCallError::Timeout { timeout_ms: 5_000 })
        );
    }

    #[tokio::test]
    async fn test_cascade_stops_on_confident_verdict() {
        let judge = Arc::new(TableJudge::new(&[
            (ModelName::GeminiFlash, true, 0.97, 1),
            (ModelName::ClaudeHaiku, false, 0.6, 1),
            (ModelName::Gpt4o, false, 0.6, 1),
        ]));
        let dispatcher = dispatcher(judge.clone(), EngineConfig::default());

        let outcome = dispatcher
            .dispatch_cascading(&models(), &DetectionPrompt::new("text"), 1, None)
            .await;

        assert!(outcome.early_stopped);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].model, ModelName::GeminiFlash);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cascade_stops_once_two_agree() {
        let judge = Arc::new(TableJudge::new(&[
            (ModelName::GeminiFlash, false, 0.7, 1),
            (ModelName::ClaudeHaiku, false, 0.8, 1),
            (ModelName::Gpt4o, true, 0.9, 1),
        ]));
        let dispatcher = dispatcher(judge, EngineConfig::default());

        let outcome = dispatcher
            .dispatch_cascading(&models(), &DetectionPrompt::new("text"), 2, None)
            .await;

        assert!(outcome.early_stopped);
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test]
    async fn test_cascade_runs_through_on_disagreement() {
        let judge = Arc::new(TableJudge::new(&[
            (ModelName::GeminiFlash, false, 0.7, 1),
            (ModelName::ClaudeHaiku, true, 0.8, 1),
            (ModelName::Gpt4o, true, 0.6, 1),
        ]));
        let dispatcher = dispatcher(judge, EngineConfig::default());

        let outcome = dispatcher
            .dispatch_cascading(&models(), &DetectionPrompt::new("text"), 2, None)
            .await;

        // The third answer makes the valid votes disagree, so no early stop
        assert!(!outcome.early_stopped);
        assert_eq!(outcome.results.len(), 3);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_judge() {
        let judge = Arc::new(TableJudge::new(&[]));
        let config = EngineConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let dispatcher = dispatcher(judge.clone(), config);
        let prompt = DetectionPrompt::new("text");

        dispatcher.dispatch_parallel(&models()[..1], &prompt).await;
        let results = dispatcher.dispatch_parallel(&models()[..1], &prompt).await;

        assert_eq!(results[0].error, Some(ModelCallError::CircuitOpen));
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            dispatcher.circuit_breaker().open_circuits(),
            vec![ModelName::Gpt4o]
        );
    }

    #[tokio::test]
    async fn test_non_probability_confidence_is_malformed() {
        let judge = Arc::new(TableJudge::new(&[
            (ModelName::Gpt4o, true, f64::NAN, 1),
            (ModelName::GeminiFlash, true, 1.5, 1),
            (ModelName::ClaudeHaiku, true, 0.8, 1),
        ]));
        let dispatcher = dispatcher(judge, EngineConfig::default());

        let results = dispatcher
            .dispatch_parallel(&models(), &DetectionPrompt::new("text"))
            .await;

        assert!(matches!(
            results[0].error,
            Some(ModelCallError::MalformedResponse { .. })
        ));
        assert!(matches!(
            results[1].error,
            Some(ModelCallError::MalformedResponse { .. })
        ));
        assert!(results[2].is_valid());
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.confidence)));
    }

    #[tokio::test]
    async fn test_budget_halts_cascade_only_after_min_models() {
        // Disagreeing answers so neither early-stop rule fires
        let judge = Arc::new(TableJudge::new(&[
            (ModelName::GeminiFlash, false, 0.7, 1),
            (ModelName::ClaudeHaiku, true, 0.8, 1),
            (ModelName::Gpt4o, true, 0.6, 1),
        ]));
        let dispatcher = dispatcher(judge.clone(), EngineConfig::default());

        // Too small for even the second call, yet two valid votes are required
        let outcome = dispatcher
            .dispatch_cascading(&models(), &DetectionPrompt::new("text"), 2, Some(0.0001))
            .await;

        let queried: Vec<ModelName> = outcome.results.iter().map(|r| r.model).collect();
        assert_eq!(queried, vec![ModelName::GeminiFlash, ModelName::ClaudeHaiku]);
        assert!(!outcome.early_stopped);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 2);

        let outcome = dispatcher
            .dispatch_cascading(&models(), &DetectionPrompt::new("text"), 1, Some(0.0001))
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
    }
}
