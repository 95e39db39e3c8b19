//! Feedback entry type

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::FeedbackPayload;

/// Unique, time-derived feedback identifier
pub type FeedbackId = String;

/// A user correction to a past ensemble prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: FeedbackId,
    pub original_prediction: Value,
    pub user_correction: Value,
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Engines responsible for learning from this correction
    pub engines_involved: Vec<String>,
    /// Engines whose feedback hook accepted it; only grows
    #[serde(default)]
    pub distributed_to: Vec<String>,
    /// Set once, when distribution finishes
    #[serde(default)]
    pub processed: bool,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEntry {
    /// Repeated names in `engines_involved` are dropped, keeping first-seen order
    pub fn new(
        original_prediction: Value,
        user_correction: Value,
        context: Map<String, Value>,
        engines_involved: Vec<String>,
    ) -> Self {
        let timestamp = Utc::now();
        let mut seen = HashSet::new();
        let engines_involved = engines_involved
            .into_iter()
            .filter(|engine| seen.insert(engine.clone()))
            .collect();
        Self {
            id: new_feedback_id(timestamp),
            original_prediction,
            user_correction,
            context,
            engines_involved,
            distributed_to: Vec::new(),
            processed: false,
            timestamp,
        }
    }

    /// What an engine's feedback hook receives
    pub fn payload(&self) -> FeedbackPayload {
        FeedbackPayload {
            original: self.original_prediction.clone(),
            correction: self.user_correction.clone(),
            context: self.context.clone(),
        }
    }

    /// Record a successful delivery. Repeats are ignored.
    pub fn mark_distributed(&mut self, engine: &str) {
        if !self.distributed_to.iter().any(|e| e == engine) {
            self.distributed_to.push(engine.to_string());
        }
    }

    /// Whether the user confirmed the original prediction
    pub fn confirms_original(&self) -> bool {
        crate::ensemble::voting::same_prediction(&self.original_prediction, &self.user_correction)
    }
}

/// `fb-<UTC timestamp to the microsecond>-<random suffix>`
fn new_feedback_id(at: DateTime<Utc>) -> FeedbackId {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("fb-{}-{}", at.format("%Y%m%dT%H%M%S%6f"), &suffix[..8])
}
