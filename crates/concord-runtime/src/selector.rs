//! Epsilon-greedy model selection.
//!
//! With probability epsilon the selector explores a random subset,
//! otherwise it exploits a ranking that blends each model's learned
//! performance with its cost:
//!
//! ```text
//! utility = perf_score * weight * complexity + cost_factor * (1 - complexity)
//! ```
//!
//! Hard queries lean on proven models, easy ones on cheap models. Every
//! selection honours `min_models`, even under a tight budget.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use concord_core::{ModelConfig, ModelName, ModelResult};

use crate::config::SelectorConfig;

/// Models chosen for one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub models: Vec<ModelName>,
    /// True when the subset came from the exploration branch
    pub explored: bool,
    pub complexity: f64,
}

/// One entry of the selection history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub models: Vec<ModelName>,
    pub explored: bool,
    pub complexity: f64,
    pub selected_at: DateTime<Utc>,
}

/// Point-in-time view of the selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSnapshot {
    pub epsilon: f64,
    pub selections: u64,
    pub scores: BTreeMap<ModelName, f64>,
    pub recent: Vec<SelectionRecord>,
}

struct SelectorState {
    rng: StdRng,
    epsilon: f64,
    selections: u64,
    history: VecDeque<SelectionRecord>,
}

/// Online bandit choosing a cost/accuracy-balanced subset of judges.
///
/// Lock order is always `state` then `scores`; neither is held across an
/// await.
pub struct AdaptiveSelector {
    config: SelectorConfig,
    state: Mutex<SelectorState>,
    scores: RwLock<HashMap<ModelName, f64>>,
}

impl AdaptiveSelector {
    /// Selector seeded from OS entropy.
    pub fn new(config: SelectorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Selector with reproducible exploration.
    pub fn with_seed(config: SelectorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SelectorConfig, rng: StdRng) -> Self {
        Self {
            state: Mutex::new(SelectorState {
                rng,
                epsilon: config.initial_epsilon,
                selections: 0,
                history: VecDeque::new(),
            }),
            scores: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Pick the models to query.
    ///
    /// `candidates` are the enabled models. The result holds at least
    /// `min(min_models, candidates.len())` distinct models.
    pub fn select(
        &self,
        candidates: &[ModelConfig],
        min_models: usize,
        budget: Option<f64>,
        complexity: f64,
    ) -> Selection {
        let complexity = complexity.clamp(0.0, 1.0);
        let floor = min_models.min(candidates.len());
        let ceiling = self.config.max_models.max(floor).min(candidates.len());

        let mut state = self.state.lock();
        let explored = state.rng.gen::<f64>() < state.epsilon;

        let models = if explored {
            let size = if ceiling > floor {
                state.rng.gen_range(floor..=ceiling)
            } else {
                floor
            };
            candidates
                .choose_multiple(&mut state.rng, size)
                .map(|c| c.name)
                .collect()
        } else {
            self.exploit(candidates, floor, ceiling, budget, complexity)
        };

        state.selections += 1;
        if self.config.decay_interval > 0 && state.selections % self.config.decay_interval == 0 {
            state.epsilon = (state.epsilon * self.config.epsilon_decay).max(self.config.min_epsilon);
            tracing::debug!(epsilon = state.epsilon, "Exploration rate decayed");
        }

        state.history.push_back(SelectionRecord {
            models: models.clone(),
            explored,
            complexity,
            selected_at: Utc::now(),
        });
        while state.history.len() > self.config.history_capacity {
            state.history.pop_front();
        }

        tracing::debug!(?models, explored, complexity, "Selected judges");

        Selection {
            models,
            explored,
            complexity,
        }
    }

    fn exploit(
        &self,
        candidates: &[ModelConfig],
        floor: usize,
        ceiling: usize,
        budget: Option<f64>,
        complexity: f64,
    ) -> Vec<ModelName> {
        let ranked = self.rank(candidates, complexity);
        let stop_at_floor = complexity < self.config.low_complexity_threshold;

        let mut chosen: Vec<ModelName> = Vec::new();
        let mut spent = 0.0;
        for config in &ranked {
            if chosen.len() >= ceiling || (stop_at_floor && chosen.len() >= floor) {
                break;
            }
            let cost = config.estimated_call_cost();
            if budget.is_some_and(|b| spent + cost > b) {
                continue;
            }
            spent += cost;
            chosen.push(config.name);
        }

        // Budget may have left us short: top up from the ranking regardless
        for config in &ranked {
            if chosen.len() >= floor {
                break;
            }
            if !chosen.contains(&config.name) {
                chosen.push(config.name);
            }
        }

        chosen
    }

    /// Candidates ordered by utility, best first. Ties break by name.
    pub fn rank(&self, candidates: &[ModelConfig], complexity: f64) -> Vec<ModelConfig> {
        let complexity = complexity.clamp(0.0, 1.0);
        let min_cost = candidates
            .iter()
            .map(|c| c.cost_per_1k_tokens)
            .filter(|c| *c > 0.0)
            .fold(f64::INFINITY, f64::min);

        let scores = self.scores.read();
        let mut ranked: Vec<(f64, &ModelConfig)> = candidates
            .iter()
            .map(|config| {
                let perf = scores
                    .get(&config.name)
                    .copied()
                    .unwrap_or(self.config.prior_score);
                let cost_factor = if config.cost_per_1k_tokens > 0.0 && min_cost.is_finite() {
                    min_cost / config.cost_per_1k_tokens
                } else {
                    1.0
                };
                let utility =
                    perf * config.weight * complexity + cost_factor * (1.0 - complexity);
                (utility, config)
            })
            .collect();
        drop(scores);

        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.name.as_str().cmp(b.1.name.as_str()))
        });
        ranked.into_iter().map(|(_, config)| config.clone()).collect()
    }

    /// Fold one detection's outcome into the performance scores.
    ///
    /// Valid results observe the consensus confidence, failed calls observe 0.
    pub fn record_outcome(&self, results: &[ModelResult], consensus_confidence: f64) {
        let lr = self.config.learning_rate;
        let mut scores = self.scores.write();
        for result in results {
            let observed = if result.is_valid() {
                consensus_confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            let score = scores
                .entry(result.model)
                .or_insert(self.config.prior_score);
            *score = (1.0 - lr) * *score + lr * observed;
        }
    }

    /// Current performance score, the prior for unseen models.
    pub fn score(&self, model: ModelName) -> f64 {
        self.scores
            .read()
            .get(&model)
            .copied()
            .unwrap_or(self.config.prior_score)
    }

    pub fn epsilon(&self) -> f64 {
        self.state.lock().epsilon
    }

    /// Recorded selections, oldest first.
    pub fn history(&self) -> Vec<SelectionRecord> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> SelectorSnapshot {
        let state = self.state.lock();
        let scores = self.scores.read();
        SelectorSnapshot {
            epsilon: state.epsilon,
            selections: state.selections,
            scores: scores.iter().map(|(m, s)| (*m, *s)).collect(),
            recent: state.history.iter().rev().take(10).cloned().collect(),
        }
    }
}

impl std::fmt::Debug for AdaptiveSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveSelector")
            .field("epsilon", &self.epsilon())
            .field("config", &self.config)
            .finish()
    }
}
