//! # concord-core
//!
//! Deterministic building blocks for multi-model hallucination consensus.
//!
//! This crate answers, without any I/O:
//! - Which judges exist and how much does each one count?
//! - Given the judges' verdicts, what does the ensemble decide?
//! - How hard is this query likely to be?
//!
//! ## Key Guarantees
//!
//! 1. **No judge calls**: querying models is the job of `concord-runtime`
//! 2. **Deterministic**: same results and weights always give the same consensus
//! 3. **Bounded**: confidence and agreement scores always lie in [0, 1]
//! 4. **Honest degradation**: failed calls never vote, and a missing quorum is flagged
//!
//! ## Example
//!
//! ```rust
//! use concord_core::{ModelConfig, ModelName, ModelResult, VoteAggregator, VotingStrategy};
//! use std::collections::HashMap;
//!
//! let gpt = ModelConfig::new(ModelName::Gpt4o);
//! let claude = ModelConfig::new(ModelName::ClaudeSonnet);
//! let results = vec![
//!     ModelResult::success(&gpt, true, 0.9, "date is wrong", 120, 800),
//!     ModelResult::success(&claude, true, 0.8, "unsupported figure", 140, 650),
//! ];
//!
//! let aggregate = VoteAggregator::new().aggregate(
//!     VotingStrategy::Majority,
//!     &results,
//!     &HashMap::new(),
//!     0.7,
//! );
//! assert!(aggregate.is_hallucination);
//! assert_eq!(aggregate.agreement_score, 1.0);
//! ```

pub mod aggregator;
pub mod complexity;
pub mod duration;
pub mod error;
pub mod registry;
pub mod request;
pub mod types;

// Re-export main types at crate root
pub use aggregator::{Aggregate, VoteAggregator};
pub use complexity::{ComplexityEstimator, HeuristicComplexityEstimator};
pub use error::ConfigurationError;
pub use registry::{ModelConfig, ModelRegistry, RegistryError, RegistryFile};
pub use request::DetectionRequest;
pub use types::{
    ConsensusResult, Degradation, ModelCallError, ModelName, ModelResult, Provider,
    VotingStrategy,
};
