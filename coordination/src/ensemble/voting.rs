//! Vote aggregation for multi-engine consensus
//!
//! Pure functions: votes in, one decision out. Collection failures never reach
//! this module; an empty vote set yields [`Decision::no_result`].
//!
//! Predictions are grouped by [`PredictionKey`]. Strings are trimmed, internal
//! whitespace collapsed, and lower-cased; any other JSON value is keyed by its
//! compact encoding, so `1` and `1.0` are different predictions.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::config::EnsembleMethod;
use crate::registry::WeightSnapshot;

use super::types::Vote;

/// Scores closer than this are treated as tied
const SCORE_EPSILON: f64 = 1e-9;

/// Canonical grouping key for a prediction value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredictionKey(String);

impl PredictionKey {
    pub fn canonical(value: &Value) -> Self {
        match value {
            Value::String(s) => Self(format!("s:{}", normalize_label(s))),
            other => Self(format!("j:{}", other)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Case-fold and collapse whitespace in a label
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether two predictions fall in the same vote group
pub fn same_prediction(a: &Value, b: &Value) -> bool {
    PredictionKey::canonical(a) == PredictionKey::canonical(b)
}

/// Outcome of aggregating one vote set
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Original value of the earliest vote in the winning group
    pub prediction: Option<Value>,
    pub confidence: f64,
    pub score: f64,
    /// Votes sharing the winning prediction
    pub support: usize,
}

impl Decision {
    pub fn no_result() -> Self {
        Self {
            prediction: None,
            confidence: 0.0,
            score: 0.0,
            support: 0,
        }
    }

    pub fn is_no_result(&self) -> bool {
        self.prediction.is_none()
    }
}

/// Votes sharing one canonical prediction, in first-appearance order
struct VoteGroup<'a> {
    key: PredictionKey,
    votes: Vec<&'a Vote>,
    score: f64,
}

impl VoteGroup<'_> {
    fn mean_confidence(&self) -> f64 {
        self.votes.iter().map(|v| v.confidence).sum::<f64>() / self.votes.len() as f64
    }

    fn representative(&self) -> Value {
        self.votes[0].prediction.clone()
    }
}

fn group_votes<'a>(votes: &'a [Vote], weights: &WeightSnapshot) -> Vec<VoteGroup<'a>> {
    let mut groups: Vec<VoteGroup<'a>> = Vec::new();
    let mut index: HashMap<PredictionKey, usize> = HashMap::new();

    for vote in votes {
        let key = PredictionKey::canonical(&vote.prediction);
        let contribution = weights.weight(&vote.engine_name) * vote.confidence;
        match index.get(&key) {
            Some(&idx) => {
                let group = &mut groups[idx];
                group.votes.push(vote);
                group.score += contribution;
            }
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(VoteGroup {
                    key,
                    votes: vec![vote],
                    score: contribution,
                });
            }
        }
    }

    groups
}

/// Combine votes under `method`
pub fn aggregate(votes: &[Vote], weights: &WeightSnapshot, method: EnsembleMethod) -> Decision {
    if votes.is_empty() {
        return Decision::no_result();
    }

    let decision = match method {
        EnsembleMethod::WeightedVote => weighted_vote(votes, weights),
        EnsembleMethod::HighestConfidence => highest_confidence(votes, weights),
        EnsembleMethod::MajorityVote => majority_vote(votes, weights),
    };

    debug!(
        method = %method,
        votes = votes.len(),
        confidence = decision.confidence,
        score = decision.score,
        "Votes aggregated"
    );

    decision
}

/// Highest Σ(weight × confidence) wins; ties go to the larger group, then the
/// group whose first vote came earliest. Confidence is the winning group's
/// mean vote confidence, not its score.
pub fn weighted_vote(votes: &[Vote], weights: &WeightSnapshot) -> Decision {
    let groups = group_votes(votes, weights);

    let mut best: Option<&VoteGroup> = None;
    for group in &groups {
        let better = match best {
            None => true,
            Some(current) => {
                if group.score > current.score + SCORE_EPSILON {
                    true
                } else if group.score < current.score - SCORE_EPSILON {
                    false
                } else {
                    group.votes.len() > current.votes.len()
                }
            }
        };
        if better {
            best = Some(group);
        }
    }

    match best {
        Some(group) => {
            debug!(winner = group.key.as_str(), score = group.score, "Weighted vote winner");
            Decision {
                prediction: Some(group.representative()),
                confidence: group.mean_confidence(),
                score: group.score,
                support: group.votes.len(),
            }
        }
        None => Decision::no_result(),
    }
}

/// Largest raw vote count wins, ignoring weight; ties go to the group whose
/// first vote came earliest. Confidence is the agreement ratio.
pub fn majority_vote(votes: &[Vote], weights: &WeightSnapshot) -> Decision {
    let groups = group_votes(votes, weights);

    let mut best: Option<&VoteGroup> = None;
    for group in &groups {
        if best.map_or(true, |current| group.votes.len() > current.votes.len()) {
            best = Some(group);
        }
    }

    match best {
        Some(group) => Decision {
            prediction: Some(group.representative()),
            confidence: group.votes.len() as f64 / votes.len() as f64,
            score: group.votes.len() as f64,
            support: group.votes.len(),
        },
        None => Decision::no_result(),
    }
}

/// The single most confident vote wins; ties go to the heavier engine, then the
/// earlier-registered one, then the earlier vote.
pub fn highest_confidence(votes: &[Vote], weights: &WeightSnapshot) -> Decision {
    let mut best: Option<&Vote> = None;
    for vote in votes {
        let better = match best {
            None => true,
            Some(current) => {
                if vote.confidence > current.confidence + SCORE_EPSILON {
                    true
                } else if vote.confidence < current.confidence - SCORE_EPSILON {
                    false
                } else {
                    let (w, cw) = (
                        weights.weight(&vote.engine_name),
                        weights.weight(&current.engine_name),
                    );
                    if w > cw + SCORE_EPSILON {
                        true
                    } else if w < cw - SCORE_EPSILON {
                        false
                    } else {
                        weights.order(&vote.engine_name) < weights.order(&current.engine_name)
                    }
                }
            }
        };
        if better {
            best = Some(vote);
        }
    }

    match best {
        Some(winner) => {
            let key = PredictionKey::canonical(&winner.prediction);
            let support = votes
                .iter()
                .filter(|v| PredictionKey::canonical(&v.prediction) == key)
                .count();
            Decision {
                prediction: Some(winner.prediction.clone()),
                confidence: winner.confidence,
                score: winner.confidence,
                support,
            }
        }
        None => Decision::no_result(),
    }
}

/// Engines whose vote confidence is under `threshold`, in vote order
pub fn below_threshold(votes: &[Vote], threshold: f64) -> Vec<String> {
    votes
        .iter()
        .filter(|v| v.confidence < threshold)
        .map(|v| v.engine_name.clone())
        .collect()
}
