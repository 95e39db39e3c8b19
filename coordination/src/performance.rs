//! Per-engine accuracy and confidence calibration
//!
//! Counters are rolled up per engine; no per-prediction log is kept, so the
//! running confidence mean is updated incrementally and never recomputed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EnsembleMethod;
use crate::engine::EngineCapabilities;
use crate::registry::clamp_weight;

/// Predictions an engine needs before its weight tracks its accuracy
pub const AUTO_WEIGHT_MIN_PREDICTIONS: u64 = 50;

/// Rolled-up performance counters for one engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnginePerformance {
    pub total_predictions: u64,
    pub correct_predictions: u64,
    pub accuracy: f64,
    pub avg_confidence: f64,
    /// `|accuracy - avg_confidence|`
    pub confidence_calibration: f64,
}

impl EnginePerformance {
    /// Fold one scored prediction into the counters
    pub fn record(&mut self, was_correct: bool, confidence: f64) {
        let confidence = clamp_weight(confidence);

        self.total_predictions += 1;
        if was_correct {
            self.correct_predictions += 1;
        }

        let n = self.total_predictions as f64;
        self.accuracy = self.correct_predictions as f64 / n;
        self.avg_confidence = ((n - 1.0) * self.avg_confidence + confidence) / n;
        self.confidence_calibration = (self.accuracy - self.avg_confidence).abs();
    }

    /// Weight this engine should carry, once it has enough history.
    ///
    /// Weight = raw accuracy. This ignores calibration and recency; a
    /// calibration-aware formula is the obvious replacement, but it would
    /// change which engines win votes.
    pub fn auto_weight(&self) -> Option<f64> {
        (self.total_predictions >= AUTO_WEIGHT_MIN_PREDICTIONS).then_some(self.accuracy)
    }
}

/// Result of one `record` call
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceUpdate {
    pub engine: String,
    pub performance: EnginePerformance,
    /// New registry weight, when the engine has crossed the sample minimum
    pub auto_weight: Option<f64>,
}

/// Performance counters for every engine that has been scored
#[derive(Debug, Clone, Default)]
pub struct PerformanceTracker {
    engines: BTreeMap<String, EnginePerformance>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(&mut self, engines: BTreeMap<String, EnginePerformance>) {
        self.engines = engines;
    }

    pub fn record(&mut self, engine: &str, was_correct: bool, confidence: f64) -> PerformanceUpdate {
        let perf = self.engines.entry(engine.to_string()).or_default();
        perf.record(was_correct, confidence);

        debug!(
            engine,
            was_correct,
            total = perf.total_predictions,
            accuracy = perf.accuracy,
            calibration = perf.confidence_calibration,
            "Engine performance recorded"
        );

        PerformanceUpdate {
            engine: engine.to_string(),
            performance: perf.clone(),
            auto_weight: perf.auto_weight(),
        }
    }

    pub fn get(&self, engine: &str) -> Option<&EnginePerformance> {
        self.engines.get(engine)
    }

    pub fn all(&self) -> &BTreeMap<String, EnginePerformance> {
        &self.engines
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// One engine's row in a [`PerformanceReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineReport {
    pub name: String,
    /// `None` for engines known only from persisted counters
    pub weight: Option<f64>,
    pub capabilities: Option<EngineCapabilities>,
    pub performance: EnginePerformance,
}

/// Snapshot of ensemble health for dashboards and operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub ensemble_method: EnsembleMethod,
    pub engines: Vec<EngineReport>,
    pub queue_len: usize,
    pub history_len: usize,
    pub retrain_count: u64,
}

impl PerformanceReport {
    pub fn engine(&self, name: &str) -> Option<&EngineReport> {
        self.engines.iter().find(|e| e.name == name)
    }

    /// Engine with the largest calibration gap among scored engines
    pub fn worst_calibrated(&self) -> Option<&EngineReport> {
        self.engines
            .iter()
            .filter(|e| e.performance.total_predictions > 0)
            .max_by(|a, b| {
                a.performance
                    .confidence_calibration
                    .partial_cmp(&b.performance.confidence_calibration)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}
