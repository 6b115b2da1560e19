//! # concord-runtime
//!
//! Async judge dispatch for Concord.
//!
//! `concord-core` decides how verdicts combine; this crate decides which
//! judges to ask and asks them:
//!
//! - [`judge`]: the single boundary to external LLM judges
//! - [`orchestrator`]: parallel and cascading dispatch with timeouts and
//!   circuit breaking
//! - [`selector`]: epsilon-greedy choice of a cost/accuracy-balanced subset
//! - [`telemetry`]: rolling per-model statistics
//! - [`engine`]: [`ConsensusEngine`], which ties it all together
//!
//! ## Example
//!
//! ```rust,ignore
//! use concord_runtime::{ConsensusEngineBuilder, JudgeRouter};
//! use concord_core::{DetectionRequest, Provider, VotingStrategy};
//!
//! let router = JudgeRouter::new()
//!     .route(Provider::Anthropic, Arc::new(AnthropicJudge::from_env()?));
//! let engine = ConsensusEngineBuilder::new().judge(Arc::new(router)).build()?;
//!
//! let result = engine
//!     .detect(
//!         DetectionRequest::new("The Eiffel Tower was completed in 1925.")
//!             .with_strategy(VotingStrategy::Cascading),
//!     )
//!     .await?;
//! println!("{} ({:.2})", result.is_hallucination, result.confidence);
//! ```

pub mod config;
pub mod engine;
pub mod judge;
pub mod orchestrator;
pub mod resilience;
pub mod selector;
pub mod telemetry;

pub use config::{CascadeConfig, ConfigError, EngineConfig, SelectorConfig};
pub use engine::{
    cost_savings, ConsensusEngine, ConsensusEngineBuilder, PerformanceReport, RuntimeError,
};
pub use judge::{parse_verdict, DetectionPrompt, JudgeClient, JudgeRouter, JudgeVerdict};
pub use orchestrator::{cascade_order, CascadeOutcome, Dispatcher};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use selector::{AdaptiveSelector, Selection, SelectionRecord, SelectorSnapshot};
pub use telemetry::{EngineUsage, ModelStats, TelemetryTracker};

#[cfg(feature = "anthropic")]
pub use judge::{AnthropicJudge, ANTHROPIC_API_KEY_ENV};
