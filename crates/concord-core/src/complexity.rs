//! Query complexity estimation for adaptive model selection.
//!
//! A complexity in [0, 1] tells the selector how much to favour accuracy
//! over cost. The heuristic estimator here is a placeholder signal; any
//! [`ComplexityEstimator`] can replace it.

use lazy_static::lazy_static;
use regex::Regex;

/// Scores how hard a detection query is likely to be.
pub trait ComplexityEstimator: Send + Sync {
    /// Estimate complexity in [0, 1] for an agent output and optional input.
    fn estimate(&self, agent_output: &str, agent_input: Option<&str>) -> f64;
}

lazy_static! {
    /// Domain vocabulary that tends to require specialist knowledge.
    static ref TECHNICAL_TERM_PATTERN: Regex = Regex::new(
        r"(?i)\b(algorithm|protocol|molecul\w*|quantum|genom\w*|neural|derivative|integral|theorem|statute|jurisdiction|diagnos\w*|pharmac\w*|enzyme|latency|throughput|cryptograph\w*|regression|coefficient|isotope|compiler|kernel|amortiz\w*|equilibrium)\b"
    ).unwrap();

    /// Markers of checkable factual claims: numbers, dates, citations.
    static ref FACTUAL_CLAIM_PATTERN: Regex = Regex::new(
        r"(?i)(\b\d{4}\b|\b\d+(\.\d+)?\s?%|\$\s?\d|\baccording to\b|\bstud(y|ies) (show|found|suggest)s?\b|\bresearch (shows|indicates)\b|\bin fact\b|\bstatistics?\b|\bwas (founded|invented|discovered|born)\b|\b(is|was) the (first|largest|only)\b)"
    ).unwrap();

    /// Hedging language that signals the agent itself was unsure.
    static ref HEDGING_PATTERN: Regex = Regex::new(
        r"(?i)\b(might|may|possibly|perhaps|likely|unlikely|probably|approximately|roughly|it seems|i think|i believe|not sure|unclear)\b"
    ).unwrap();

    static ref SENTENCE_END_PATTERN: Regex = Regex::new(r"[.!?]+(\s|$)").unwrap();
}

/// Keyword and length heuristics over the agent output.
#[derive(Debug, Clone)]
pub struct HeuristicComplexityEstimator {
    /// Word count at which the length signal saturates
    pub length_saturation_words: usize,
    /// Sentence count at which the sentence signal saturates
    pub sentence_saturation: usize,
}

impl Default for HeuristicComplexityEstimator {
    fn default() -> Self {
        Self {
            length_saturation_words: 400,
            sentence_saturation: 15,
        }
    }
}

impl HeuristicComplexityEstimator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComplexityEstimator for HeuristicComplexityEstimator {
    fn estimate(&self, agent_output: &str, agent_input: Option<&str>) -> f64 {
        let words = agent_output.split_whitespace().count();
        if words == 0 {
            return 0.0;
        }
        let words_f = words as f64;

        let length = (words_f / self.length_saturation_words as f64).min(1.0);

        // Density per 20 words, so a handful of terms in a short answer counts
        let technical =
            (TECHNICAL_TERM_PATTERN.find_iter(agent_output).count() as f64 * 20.0 / words_f).min(1.0);
        let factual =
            (FACTUAL_CLAIM_PATTERN.find_iter(agent_output).count() as f64 * 10.0 / words_f).min(1.0);
        let hedging =
            (HEDGING_PATTERN.find_iter(agent_output).count() as f64 * 20.0 / words_f).min(1.0);

        let sentences = SENTENCE_END_PATTERN.find_iter(agent_output).count().max(1);
        let sentence = (sentences as f64 / self.sentence_saturation as f64).min(1.0);

        let mut score =
            0.2 * length + 0.25 * technical + 0.25 * factual + 0.15 * sentence + 0.15 * hedging;

        // A technical question raises the bar even for a short answer
        if let Some(input) = agent_input {
            if TECHNICAL_TERM_PATTERN.is_match(input) {
                score += 0.05;
            }
        }

        score.clamp(0.0, 1.0)
    }
}
