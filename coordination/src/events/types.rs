//! Event types for coordinator telemetry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EnsembleMethod;
use crate::registry::Registration;

/// Everything the coordinator announces on its event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    /// An engine was registered or its handle replaced
    EngineRegistered {
        engine: String,
        registration: Registration,
        weight: f64,
        timestamp: DateTime<Utc>,
    },

    /// An engine's voting weight changed
    WeightAdjusted {
        engine: String,
        previous: f64,
        weight: f64,
        reason: WeightChangeReason,
        timestamp: DateTime<Utc>,
    },

    /// An engine was excluded from a vote
    EngineUnavailable {
        engine: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// `ensemble_predict` produced a result
    EnsembleDecided {
        strategy: EnsembleMethod,
        decided: bool,
        confidence: f64,
        votes: usize,
        timestamp: DateTime<Utc>,
    },

    /// A correction was queued
    FeedbackSubmitted {
        feedback_id: String,
        engines_involved: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A correction was distributed and archived
    FeedbackDistributed {
        feedback_id: String,
        distributed_to: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The retrain threshold fired
    RetrainTriggered {
        queue_len: usize,
        signalled: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A document could not be written
    PersistenceFailed {
        document: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// Why a weight changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightChangeReason {
    /// Performance tracker set weight to accuracy
    Accuracy,
    /// Explicit admin call
    Admin,
}

impl CoordinatorEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::EngineRegistered { timestamp, .. }
            | Self::WeightAdjusted { timestamp, .. }
            | Self::EngineUnavailable { timestamp, .. }
            | Self::EnsembleDecided { timestamp, .. }
            | Self::FeedbackSubmitted { timestamp, .. }
            | Self::FeedbackDistributed { timestamp, .. }
            | Self::RetrainTriggered { timestamp, .. }
            | Self::PersistenceFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EngineRegistered { .. } => "engine_registered",
            Self::WeightAdjusted { .. } => "weight_adjusted",
            Self::EngineUnavailable { .. } => "engine_unavailable",
            Self::EnsembleDecided { .. } => "ensemble_decided",
            Self::FeedbackSubmitted { .. } => "feedback_submitted",
            Self::FeedbackDistributed { .. } => "feedback_distributed",
            Self::RetrainTriggered { .. } => "retrain_triggered",
            Self::PersistenceFailed { .. } => "persistence_failed",
        }
    }

    /// Get the engine name if this event is engine-scoped
    pub fn engine(&self) -> Option<&str> {
        match self {
            Self::EngineRegistered { engine, .. }
            | Self::WeightAdjusted { engine, .. }
            | Self::EngineUnavailable { engine, .. } => Some(engine),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CoordinatorEvent::EngineRegistered {
            engine: "bayes".to_string(),
            registration: Registration::AlreadyRegistered,
            weight: 1.0,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "engine_registered");
        assert_eq!(json["registration"], "already_registered");
        assert_eq!(event.event_type(), "engine_registered");
        assert_eq!(event.engine(), Some("bayes"));
    }
}
