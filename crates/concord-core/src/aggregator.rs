//! Vote aggregation: reduces per-model verdicts into one consensus.
//!
//! Only error-free results vote. With no valid results the aggregate is a
//! zero-confidence "no decision" flagged as [`Degradation::NoValidVotes`].
//!
//! Strategy formulas (n = valid votes, t = true votes):
//! - Majority: verdict `t > n/2`, confidence `mean(conf) * agreement`
//! - Weighted: effective weight `weight * conf`, verdict on weighted share > 0.5
//! - Unanimous: verdict only if all true, agreement 1.0 or 0.0
//! - Threshold: verdict `t/n >= threshold`
//! - Cascading and Adaptive reuse Weighted over whatever was dispatched

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Degradation, ModelName, ModelResult, VotingStrategy};

/// Outcome of reducing a set of model results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub is_hallucination: bool,
    pub confidence: f64,
    pub agreement_score: f64,
    pub hallucination_score: f64,
    pub models_voted: usize,
    pub models_agreed: usize,
    pub rationale: String,
    pub degradation: Option<Degradation>,
}

impl Aggregate {
    /// The "no decision" outcome when every call failed.
    fn unavailable(failed: usize) -> Self {
        Self {
            is_hallucination: false,
            confidence: 0.0,
            agreement_score: 0.0,
            hallucination_score: 0.0,
            models_voted: 0,
            models_agreed: 0,
            rationale: format!(
                "Consensus unavailable: all {} judge calls failed, no decision reached",
                failed
            ),
            degradation: Some(Degradation::NoValidVotes),
        }
    }

    /// Flag the aggregate when fewer than `required` judges voted.
    ///
    /// The verdict from the valid votes is kept, but confidence is scaled by
    /// `voted / required` and the rationale leads with the degradation.
    pub fn require_votes(mut self, required: usize) -> Self {
        if self.models_voted == 0 || self.models_voted >= required {
            return self;
        }
        let scale = self.models_voted as f64 / required as f64;
        self.confidence = (self.confidence * scale).clamp(0.0, 1.0);
        self.rationale = format!(
            "DEGRADED: insufficient valid votes ({} of {} required). {}",
            self.models_voted, required, self.rationale
        );
        self.degradation = Some(Degradation::InsufficientVotes {
            valid: self.models_voted,
            required,
        });
        self
    }
}

/// Reduces model results to a consensus under a voting strategy.
#[derive(Debug, Clone, Default)]
pub struct VoteAggregator;

struct Tally<'a> {
    valid: Vec<&'a ModelResult>,
    failed: usize,
    trues: usize,
}

impl<'a> Tally<'a> {
    fn new(results: &'a [ModelResult]) -> Self {
        let valid: Vec<&ModelResult> = results.iter().filter(|r| r.is_valid()).collect();
        let trues = valid.iter().filter(|r| r.is_hallucination).count();
        Self {
            failed: results.len() - valid.len(),
            valid,
            trues,
        }
    }

    fn total(&self) -> usize {
        self.valid.len()
    }

    fn falses(&self) -> usize {
        self.total() - self.trues
    }

    fn true_ratio(&self) -> f64 {
        self.trues as f64 / self.total() as f64
    }

    /// Share of votes on the larger side, independent of weighting.
    fn count_agreement(&self) -> f64 {
        self.trues.max(self.falses()) as f64 / self.total() as f64
    }

    fn mean_confidence(&self) -> f64 {
        self.valid.iter().map(|r| r.confidence).sum::<f64>() / self.total() as f64
    }

    fn agreeing_with(&self, verdict: bool) -> usize {
        if verdict {
            self.trues
        } else {
            self.falses()
        }
    }

    fn failure_note(&self) -> String {
        if self.failed == 0 {
            String::new()
        } else {
            format!(" ({} failed call(s) excluded)", self.failed)
        }
    }
}

impl VoteAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate `results` under `strategy`.
    ///
    /// # Arguments
    /// * `weights` - configured voting weight per model (missing models weigh 1.0)
    /// * `threshold` - vote-share threshold for [`VotingStrategy::Threshold`]
    pub fn aggregate(
        &self,
        strategy: VotingStrategy,
        results: &[ModelResult],
        weights: &HashMap<ModelName, f64>,
        threshold: f64,
    ) -> Aggregate {
        let tally = Tally::new(results);
        if tally.total() == 0 {
            tracing::warn!(failed = tally.failed, strategy = %strategy, "No valid votes to aggregate");
            return Aggregate::unavailable(tally.failed);
        }

        let aggregate = match strategy {
            VotingStrategy::Majority => self.majority(&tally),
            VotingStrategy::Unanimous => self.unanimous(&tally),
            VotingStrategy::Threshold => self.threshold(&tally, threshold),
            VotingStrategy::Weighted | VotingStrategy::Cascading | VotingStrategy::Adaptive => {
                self.weighted(&tally, weights)
            }
        };

        tracing::debug!(
            strategy = %strategy,
            voted = aggregate.models_voted,
            is_hallucination = aggregate.is_hallucination,
            confidence = aggregate.confidence,
            agreement = aggregate.agreement_score,
            "Votes aggregated"
        );
        aggregate
    }

    fn majority(&self, tally: &Tally<'_>) -> Aggregate {
        let total = tally.total();
        let verdict = tally.trues * 2 > total;
        let agreement = tally.count_agreement();

        Aggregate {
            is_hallucination: verdict,
            confidence: (tally.mean_confidence() * agreement).clamp(0.0, 1.0),
            agreement_score: agreement,
            hallucination_score: tally.true_ratio(),
            models_voted: total,
            models_agreed: tally.agreeing_with(verdict),
            rationale: format!(
                "Majority vote: {}/{} judges flagged a hallucination{}",
                tally.trues,
                total,
                tally.failure_note()
            ),
            degradation: None,
        }
    }

    fn weighted(&self, tally: &Tally<'_>, weights: &HashMap<ModelName, f64>) -> Aggregate {
        let weight_of = |model: ModelName| {
            weights
                .get(&model)
                .copied()
                .filter(|w| w.is_finite() && *w > 0.0)
                .unwrap_or(1.0)
        };

        let mut effective_true = 0.0;
        let mut effective_total = 0.0;
        let mut weight_total = 0.0;

        for result in &tally.valid {
            let weight = weight_of(result.model);
            let effective = weight * result.confidence;
            effective_total += effective;
            if result.is_hallucination {
                effective_true += effective;
            }
            weight_total += weight;
        }

        // All judges reported zero confidence: fall back to the plain vote share
        let score = if effective_total > 0.0 {
            effective_true / effective_total
        } else {
            tally.true_ratio()
        };
        let verdict = score > 0.5;
        let decisiveness = if verdict { score } else { 1.0 - score };
        // Weight-averaged judge confidence
        let mean_confidence = effective_total / weight_total;

        Aggregate {
            is_hallucination: verdict,
            confidence: (decisiveness * mean_confidence).clamp(0.0, 1.0),
            agreement_score: tally.count_agreement(),
            hallucination_score: score.clamp(0.0, 1.0),
            models_voted: tally.total(),
            models_agreed: tally.agreeing_with(verdict),
            rationale: format!(
                "Weighted vote: hallucination score {:.2} across {} judges{}",
                score,
                tally.total(),
                tally.failure_note()
            ),
            degradation: None,
        }
    }

    fn unanimous(&self, tally: &Tally<'_>) -> Aggregate {
        let total = tally.total();
        let all_true = tally.trues == total;
        let is_unanimous = all_true || tally.trues == 0;

        let (confidence, rationale) = if is_unanimous {
            (
                tally.mean_confidence(),
                format!(
                    "Unanimous: all {} judges agree the output is {}{}",
                    total,
                    if all_true { "hallucinated" } else { "grounded" },
                    tally.failure_note()
                ),
            )
        } else {
            (
                0.5,
                format!(
                    "Split vote: {}/{} judges flagged a hallucination, unanimity not reached{}",
                    tally.trues,
                    total,
                    tally.failure_note()
                ),
            )
        };

        Aggregate {
            is_hallucination: all_true,
            confidence: confidence.clamp(0.0, 1.0),
            agreement_score: if is_unanimous { 1.0 } else { 0.0 },
            hallucination_score: tally.true_ratio(),
            models_voted: total,
            models_agreed: tally.agreeing_with(all_true),
            rationale,
            degradation: None,
        }
    }

    fn threshold(&self, tally: &Tally<'_>, threshold: f64) -> Aggregate {
        let ratio = tally.true_ratio();
        let verdict = ratio >= threshold;
        let agreement = if verdict { ratio } else { 1.0 - ratio };

        Aggregate {
            is_hallucination: verdict,
            confidence: (tally.mean_confidence() * agreement).clamp(0.0, 1.0),
            agreement_score: agreement,
            hallucination_score: ratio,
            models_voted: tally.total(),
            models_agreed: tally.agreeing_with(verdict),
            rationale: format!(
                "Threshold vote: {:.0}% of judges flagged a hallucination (threshold {:.0}%){}",
                ratio * 100.0,
                threshold * 100.0,
                tally.failure_note()
            ),
            degradation: None,
        }
    }
}
