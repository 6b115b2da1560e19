//! The consensus engine: one explicit object owning the registry, the
//! dispatcher, the adaptive selector and telemetry.
//!
//! # Detection flow
//! 1. Validate the request against the registry (no judge calls on failure)
//! 2. Pick the model set and dispatch it (parallel, cascading or adaptive)
//! 3. Aggregate the verdicts under the requested strategy
//! 4. Update telemetry and selector scores
//!
//! ```rust,ignore
//! let engine = ConsensusEngineBuilder::new()
//!     .judge(Arc::new(router))
//!     .registry(ModelRegistry::with_defaults())
//!     .build()?;
//!
//! let result = engine.detect(DetectionRequest::new(output)).await?;
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

use concord_core::{
    ComplexityEstimator, ConfigurationError, ConsensusResult, DetectionRequest,
    HeuristicComplexityEstimator, ModelConfig, ModelName, ModelRegistry, ModelResult,
    VoteAggregator, VotingStrategy,
};

use crate::config::{ConfigError, EngineConfig};
use crate::judge::{DetectionPrompt, JudgeClient};
use crate::orchestrator::Dispatcher;
use crate::selector::{AdaptiveSelector, SelectorSnapshot};
use crate::telemetry::{EngineUsage, ModelStats, TelemetryTracker};

/// Errors from the consensus engine.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Judge client not configured: {0}")]
    NotConfigured(String),
}

/// Everything the engine knows about past detections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub models: BTreeMap<ModelName, ModelStats>,
    pub selector: SelectorSnapshot,
    pub usage: EngineUsage,
    pub open_circuits: Vec<ModelName>,
}

/// Raw outcome of the dispatch phase.
struct Dispatched {
    results: Vec<ModelResult>,
    selected: Option<Vec<ModelName>>,
    early_stopped: bool,
}

/// Multi-model hallucination consensus engine.
///
/// `Send + Sync`; share it behind an `Arc`.
pub struct ConsensusEngine {
    registry: RwLock<ModelRegistry>,
    dispatcher: Dispatcher,
    selector: AdaptiveSelector,
    telemetry: TelemetryTracker,
    aggregator: VoteAggregator,
    complexity: Arc<dyn ComplexityEstimator>,
    config: EngineConfig,
}

impl ConsensusEngine {
    /// Run one detection.
    ///
    /// Only configuration problems are errors. Judge failures are recorded
    /// per model and a missing quorum is reported through
    /// [`ConsensusResult::degradation`].
    pub async fn detect(&self, request: DetectionRequest) -> Result<ConsensusResult, RuntimeError> {
        request.validate()?;

        let (enabled, weights) = {
            let registry = self.registry.read();
            (registry.enabled(), registry.weights())
        };
        if enabled.len() < request.min_models {
            return Err(ConfigurationError::InsufficientModels {
                required: request.min_models,
                enabled: enabled.len(),
            }
            .into());
        }

        let started = Instant::now();
        let prompt = DetectionPrompt::from_request(&request);

        let dispatched = match request.strategy {
            VotingStrategy::Cascading => {
                let outcome = self
                    .dispatcher
                    .dispatch_cascading(
                        &enabled,
                        &prompt,
                        request.min_models,
                        request.budget_constraint,
                    )
                    .await;
                Dispatched {
                    results: outcome.results,
                    selected: None,
                    early_stopped: outcome.early_stopped,
                }
            }
            VotingStrategy::Adaptive => {
                self.dispatch_adaptive(&request, &enabled, &weights, &prompt)
                    .await
            }
            _ => Dispatched {
                results: self.dispatcher.dispatch_parallel(&enabled, &prompt).await,
                selected: None,
                early_stopped: false,
            },
        };

        let results = dispatched.results;
        let aggregate = self.aggregator.aggregate(
            request.strategy,
            &results,
            &weights,
            request.confidence_threshold,
        );
        // An early-stopped cascade settled the question with fewer votes
        let aggregate = if dispatched.early_stopped {
            aggregate
        } else {
            aggregate.require_votes(request.min_models)
        };

        self.telemetry.record_results(&results);
        self.selector.record_outcome(&results, aggregate.confidence);

        let consensus = ConsensusResult {
            is_hallucination: aggregate.is_hallucination,
            confidence: aggregate.confidence,
            agreement_score: aggregate.agreement_score,
            hallucination_score: aggregate.hallucination_score,
            strategy: request.strategy,
            models_queried: results.len(),
            models_voted: aggregate.models_voted,
            models_agreed: aggregate.models_agreed,
            rationale: aggregate.rationale,
            total_latency_ms: started.elapsed().as_millis() as u64,
            total_cost: results.iter().map(|r| r.cost).sum(),
            cost_savings: cost_savings(&enabled, &results),
            selected_models: dispatched.selected,
            degradation: aggregate.degradation,
            early_stopped: dispatched.early_stopped,
            detected_at: chrono::Utc::now(),
            model_results: results,
        };

        self.telemetry.record_detection(&consensus);

        if consensus.is_degraded() {
            tracing::warn!(
                strategy = %consensus.strategy,
                voted = consensus.models_voted,
                required = request.min_models,
                "Consensus degraded"
            );
        }
        tracing::info!(
            strategy = %consensus.strategy,
            is_hallucination = consensus.is_hallucination,
            confidence = consensus.confidence,
            agreement = consensus.agreement_score,
            queried = consensus.models_queried,
            cost = consensus.total_cost,
            latency_ms = consensus.total_latency_ms,
            "Detection complete"
        );

        Ok(consensus)
    }

    /// Adaptive round, plus one escalation round when the first consensus
    /// is less confident than the request demands.
    async fn dispatch_adaptive(
        &self,
        request: &DetectionRequest,
        enabled: &[ModelConfig],
        weights: &HashMap<ModelName, f64>,
        prompt: &DetectionPrompt,
    ) -> Dispatched {
        let complexity = request.context_complexity.unwrap_or_else(|| {
            self.complexity
                .estimate(&request.agent_output, request.agent_input.as_deref())
        });
        let selection = self.selector.select(
            enabled,
            request.min_models,
            request.budget_constraint,
            complexity,
        );

        let chosen: Vec<ModelConfig> = selection
            .models
            .iter()
            .filter_map(|name| enabled.iter().find(|c| c.name == *name).cloned())
            .collect();
        let mut selected = selection.models.clone();
        let mut results = self.dispatcher.dispatch_parallel(&chosen, prompt).await;

        if !self.config.selector.escalate_below_threshold {
            return Dispatched {
                results,
                selected: Some(selected),
                early_stopped: false,
            };
        }

        let first = self
            .aggregator
            .aggregate(
                VotingStrategy::Adaptive,
                &results,
                weights,
                request.confidence_threshold,
            )
            .require_votes(request.min_models);

        if first.confidence < request.confidence_threshold {
            let mut planned: f64 = results.iter().map(|r| r.cost).sum();
            let escalation: Vec<ModelConfig> = self
                .selector
                .rank(enabled, complexity)
                .into_iter()
                .filter(|c| !selected.contains(&c.name))
                .filter(|c| {
                    let cost = c.estimated_call_cost();
                    let affordable = request
                        .budget_constraint
                        .map_or(true, |budget| planned + cost <= budget);
                    if affordable {
                        planned += cost;
                    }
                    affordable
                })
                .collect();

            if !escalation.is_empty() {
                tracing::debug!(
                    confidence = first.confidence,
                    threshold = request.confidence_threshold,
                    extra = escalation.len(),
                    "Escalating adaptive detection"
                );
                selected.extend(escalation.iter().map(|c| c.name));
                results.extend(self.dispatcher.dispatch_parallel(&escalation, prompt).await);
            }
        }

        Dispatched {
            results,
            selected: Some(selected),
            early_stopped: false,
        }
    }

    /// Insert or replace a model config. Returns the previous config.
    pub fn configure_model(&self, config: ModelConfig) -> Result<Option<ModelConfig>, RuntimeError> {
        let name = config.name;
        let previous = self.registry.write().upsert(config)?;
        tracing::info!(model = %name, replaced = previous.is_some(), "Model configured");
        Ok(previous)
    }

    pub fn enable_model(&self, name: ModelName) -> Result<(), RuntimeError> {
        self.registry.write().enable(name)?;
        tracing::info!(model = %name, "Model enabled");
        Ok(())
    }

    pub fn disable_model(&self, name: ModelName) -> Result<(), RuntimeError> {
        self.registry.write().disable(name)?;
        tracing::info!(model = %name, "Model disabled");
        Ok(())
    }

    /// Every registered model, ordered by name.
    pub fn list_models(&self) -> Vec<ModelConfig> {
        self.registry.read().list()
    }

    pub fn get_performance_stats(&self) -> PerformanceReport {
        PerformanceReport {
            models: self.telemetry.snapshot(),
            selector: self.selector.snapshot(),
            usage: self.telemetry.usage(),
            open_circuits: self.dispatcher.circuit_breaker().open_circuits(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Estimated spend avoided by not querying every enabled model.
///
/// Each unqueried model is priced at the mean token count of the valid
/// results, or its `max_tokens` when nothing succeeded.
pub fn cost_savings(enabled: &[ModelConfig], results: &[ModelResult]) -> f64 {
    let valid: Vec<&ModelResult> = results.iter().filter(|r| r.is_valid()).collect();
    let mean_tokens = if valid.is_empty() {
        None
    } else {
        Some(valid.iter().map(|r| r.tokens_used as f64).sum::<f64>() / valid.len() as f64)
    };

    let avoided: f64 = enabled
        .iter()
        .filter(|c| !results.iter().any(|r| r.model == c.name))
        .map(|c| {
            let tokens = mean_tokens.unwrap_or(c.max_tokens as f64);
            tokens / 1000.0 * c.cost_per_1k_tokens
        })
        .sum();

    avoided.max(0.0)
}

/// Builder for [`ConsensusEngine`].
pub struct ConsensusEngineBuilder {
    judge: Option<Arc<dyn JudgeClient>>,
    registry: ModelRegistry,
    config: EngineConfig,
    seed: Option<u64>,
    complexity: Option<Arc<dyn ComplexityEstimator>>,
}

impl ConsensusEngineBuilder {
    /// Start from the default roster and default config.
    pub fn new() -> Self {
        Self {
            judge: None,
            registry: ModelRegistry::with_defaults(),
            config: EngineConfig::default(),
            seed: None,
            complexity: None,
        }
    }

    /// Set the judge client.
    pub fn judge(mut self, judge: Arc<dyn JudgeClient>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the selector's exploration.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replace the heuristic complexity estimator.
    pub fn complexity_estimator(mut self, estimator: Arc<dyn ComplexityEstimator>) -> Self {
        self.complexity = Some(estimator);
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<ConsensusEngine, RuntimeError> {
        let judge = self
            .judge
            .ok_or_else(|| RuntimeError::NotConfigured("No judge client set".to_string()))?;
        self.config.validate()?;

        let selector = match self.seed {
            Some(seed) => AdaptiveSelector::with_seed(self.config.selector.clone(), seed),
            None => AdaptiveSelector::new(self.config.selector.clone()),
        };

        Ok(ConsensusEngine {
            registry: RwLock::new(self.registry),
            dispatcher: Dispatcher::new(judge, &self.config),
            selector,
            telemetry: TelemetryTracker::new(),
            aggregator: VoteAggregator::new(),
            complexity: self
                .complexity
                .unwrap_or_else(|| Arc::new(HeuristicComplexityEstimator::new())),
            config: self.config,
        })
    }
}

impl Default for ConsensusEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
