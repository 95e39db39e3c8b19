//! Votes and ensemble results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::EnsembleMethod;
use crate::engine::EnginePrediction;

/// Context key under which [`EnsembleResult::feedback_context`] records votes
pub const VOTES_CONTEXT_KEY: &str = "votes";

/// One engine's prediction for a single `ensemble_predict` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub engine_name: String,
    pub prediction: Value,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Vote {
    pub fn new(engine_name: impl Into<String>, prediction: impl Into<Value>, confidence: f64) -> Self {
        Self {
            engine_name: engine_name.into(),
            prediction: prediction.into(),
            confidence,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn from_prediction(engine_name: impl Into<String>, output: EnginePrediction) -> Self {
        Self {
            engine_name: engine_name.into(),
            prediction: output.prediction,
            confidence: output.confidence,
            metadata: output.metadata,
            timestamp: Utc::now(),
        }
    }
}

/// Why a result carries no prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFlag {
    /// Nothing was registered or the engine filter matched nothing
    NoEnginesSelected,
    /// Engines were called but none produced a usable vote
    NoVotesCollected,
}

/// An engine excluded from the vote set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineFailure {
    pub engine_name: String,
    pub reason: String,
}

/// The combined verdict of one `ensemble_predict` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// `None` is the no-result sentinel; see `flag`
    pub prediction: Option<Value>,
    pub confidence: f64,
    pub strategy_used: EnsembleMethod,
    pub votes: Vec<Vote>,
    pub timestamp: DateTime<Utc>,
    /// Winning group's accumulated score (weighted), count (majority), or
    /// confidence (highest)
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub flag: Option<ResultFlag>,
    /// Engines whose vote was under `min_confidence_threshold`
    #[serde(default)]
    pub below_threshold: Vec<String>,
    #[serde(default)]
    pub failures: Vec<EngineFailure>,
}

impl EnsembleResult {
    pub fn no_result(
        strategy: EnsembleMethod,
        flag: ResultFlag,
        votes: Vec<Vote>,
        failures: Vec<EngineFailure>,
    ) -> Self {
        Self {
            prediction: None,
            confidence: 0.0,
            strategy_used: strategy,
            votes,
            timestamp: Utc::now(),
            score: 0.0,
            flag: Some(flag),
            below_threshold: Vec::new(),
            failures,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.prediction.is_some()
    }

    /// Context map for `submit_feedback` that carries this result's vote trail,
    /// so each engine can be scored against the correction.
    pub fn feedback_context(&self) -> Map<String, Value> {
        let votes: Vec<Value> = self
            .votes
            .iter()
            .map(|v| {
                serde_json::to_value(RecordedVote {
                    engine_name: v.engine_name.clone(),
                    prediction: v.prediction.clone(),
                    confidence: v.confidence,
                })
                .unwrap_or(Value::Null)
            })
            .collect();

        let mut context = Map::new();
        context.insert(VOTES_CONTEXT_KEY.to_string(), Value::Array(votes));
        context.insert(
            "strategy".to_string(),
            Value::String(self.strategy_used.to_string()),
        );
        context.insert(
            "ensemble_confidence".to_string(),
            serde_json::json!(self.confidence),
        );
        context
    }
}

/// Minimal vote record kept in feedback context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedVote {
    pub engine_name: String,
    pub prediction: Value,
    pub confidence: f64,
}

impl RecordedVote {
    /// Votes recorded under [`VOTES_CONTEXT_KEY`]. Malformed records are skipped.
    pub fn from_context(context: &Map<String, Value>) -> Vec<RecordedVote> {
        context
            .get(VOTES_CONTEXT_KEY)
            .and_then(Value::as_array)
            .map(|votes| {
                votes
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}
