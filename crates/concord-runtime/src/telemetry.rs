//! Rolling per-model call statistics.
//!
//! Updated once per [`ModelResult`], failures included. Failed calls count
//! towards totals but stay out of the latency and confidence averages.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use concord_core::{ConsensusResult, ModelName, ModelResult};

/// Accumulated statistics for one judge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,

    /// Running mean over successful calls
    pub avg_latency_ms: f64,

    /// Running mean over successful calls
    pub avg_confidence: f64,

    pub total_cost: f64,
    pub total_tokens: u64,
    pub last_called: Option<DateTime<Utc>>,
}

impl ModelStats {
    /// Fold one result into the stats.
    pub fn record(&mut self, result: &ModelResult, at: DateTime<Utc>) {
        self.total_calls += 1;
        self.total_cost += result.cost;
        self.total_tokens += result.tokens_used as u64;
        self.last_called = Some(at);

        if result.is_valid() {
            self.successful_calls += 1;
            let n = self.successful_calls as f64;
            self.avg_latency_ms += (result.latency_ms as f64 - self.avg_latency_ms) / n;
            self.avg_confidence += (result.confidence - self.avg_confidence) / n;
        } else {
            self.failed_calls += 1;
        }
    }

    /// Share of calls that returned a verdict. 0.0 before any call.
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

/// Engine-wide usage totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineUsage {
    pub detections: u64,
    pub degraded_detections: u64,
    pub total_cost: f64,
    pub total_savings: f64,
}

#[derive(Debug, Default)]
struct TelemetryState {
    models: HashMap<ModelName, ModelStats>,
    usage: EngineUsage,
}

/// Thread-safe telemetry store. Read externally through snapshots only.
#[derive(Debug, Default)]
pub struct TelemetryTracker {
    state: RwLock<TelemetryState>,
}

impl TelemetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every per-model result of one detection.
    pub fn record_results(&self, results: &[ModelResult]) {
        let now = Utc::now();
        let mut state = self.state.write();
        for result in results {
            state
                .models
                .entry(result.model)
                .or_default()
                .record(result, now);
        }
    }

    /// Record the engine-level outcome of one detection.
    pub fn record_detection(&self, consensus: &ConsensusResult) {
        let mut state = self.state.write();
        state.usage.detections += 1;
        if consensus.is_degraded() {
            state.usage.degraded_detections += 1;
        }
        state.usage.total_cost += consensus.total_cost;
        state.usage.total_savings += consensus.cost_savings;
    }

    pub fn model_stats(&self, model: ModelName) -> Option<ModelStats> {
        self.state.read().models.get(&model).cloned()
    }

    /// Stats for every model seen so far, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<ModelName, ModelStats> {
        self.state
            .read()
            .models
            .iter()
            .map(|(name, stats)| (*name, stats.clone()))
            .collect()
    }

    pub fn usage(&self) -> EngineUsage {
        self.state.read().usage.clone()
    }
}
