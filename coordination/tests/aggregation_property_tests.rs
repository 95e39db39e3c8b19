//! Aggregation property tests: sweeps of vote sets and weight tables that
//! check the aggregation invariants hold everywhere, not just in scenarios.
//!
//! Tests verify:
//! - Weighted-vote confidence is the mean of exactly the winning group
//! - Weighted-vote score is the winning group's Σ(weight × confidence)
//! - Majority-vote confidence is winner_count / total_votes
//! - Highest-confidence returns the maximum vote confidence
//! - Registry weights stay in [0, 1] under any write
//! - Aggregation never reports a prediction for an empty vote set

use ensemble_feedback::ensemble::voting::{aggregate, majority_vote, weighted_vote, PredictionKey};
use ensemble_feedback::registry::clamp_weight;
use ensemble_feedback::testing::LabelEngine;
use ensemble_feedback::{EngineHandle, EngineRegistry, EnsembleMethod, Vote, WeightSnapshot};
use serde_json::json;

const LABELS: [&str; 4] = ["Junior", "Mid", "Senior", "Lead"];

/// Deterministic vote set: engine `e{i}` votes a label picked by `stride`.
fn make_votes(count: usize, stride: usize, label_count: usize) -> Vec<Vote> {
    (0..count)
        .map(|i| {
            let label = LABELS[(i * stride) % label_count];
            let confidence = 0.05 + ((i * 37 + stride * 11) % 90) as f64 / 100.0;
            Vote::new(format!("e{}", i), label, confidence)
        })
        .collect()
}

fn make_weights(count: usize, seed: usize) -> WeightSnapshot {
    WeightSnapshot::from_weights(
        (0..count).map(|i| (format!("e{}", i), ((i * 13 + seed * 7) % 11) as f64 / 10.0)),
    )
}

fn winning_group<'a>(votes: &'a [Vote], prediction: &serde_json::Value) -> Vec<&'a Vote> {
    let key = PredictionKey::canonical(prediction);
    votes
        .iter()
        .filter(|v| PredictionKey::canonical(&v.prediction) == key)
        .collect()
}

// ── Property: weighted confidence is the winning group's mean ──────

#[test]
fn prop_weighted_confidence_is_group_mean() {
    for count in [1, 2, 3, 5, 8, 13] {
        for stride in [1, 2, 3] {
            for label_count in [1, 2, 4] {
                let votes = make_votes(count, stride, label_count);
                let weights = make_weights(count, stride + label_count);

                let decision = weighted_vote(&votes, &weights);
                let prediction = decision.prediction.clone().expect("non-empty votes decide");
                let group = winning_group(&votes, &prediction);

                let mean = group.iter().map(|v| v.confidence).sum::<f64>() / group.len() as f64;
                assert!(
                    (decision.confidence - mean).abs() < 1e-12,
                    "count={} stride={} labels={}: {} != {}",
                    count,
                    stride,
                    label_count,
                    decision.confidence,
                    mean
                );
                assert_eq!(decision.support, group.len());

                let score: f64 = group
                    .iter()
                    .map(|v| weights.weight(&v.engine_name) * v.confidence)
                    .sum();
                assert!((decision.score - score).abs() < 1e-12);
            }
        }
    }
}

// ── Property: weighted winner has the maximal score ────────────────

#[test]
fn prop_weighted_winner_has_max_score() {
    for count in [2, 4, 7, 12] {
        for seed in 0..5 {
            let votes = make_votes(count, seed + 1, 4);
            let weights = make_weights(count, seed);
            let decision = weighted_vote(&votes, &weights);

            for label in LABELS {
                let group = winning_group(&votes, &json!(label));
                let score: f64 = group
                    .iter()
                    .map(|v| weights.weight(&v.engine_name) * v.confidence)
                    .sum();
                assert!(score <= decision.score + 1e-9);
            }
        }
    }
}

// ── Property: majority confidence is the agreement ratio ───────────

#[test]
fn prop_majority_confidence_is_ratio() {
    for count in [1, 2, 3, 6, 10, 25] {
        for label_count in [1, 2, 3, 4] {
            let votes = make_votes(count, 1, label_count);
            let weights = make_weights(count, 0);
            let decision = majority_vote(&votes, &weights);

            let prediction = decision.prediction.clone().unwrap();
            let winners = winning_group(&votes, &prediction).len();
            assert!((decision.confidence - winners as f64 / count as f64).abs() < 1e-12);

            for label in LABELS.iter().take(label_count) {
                assert!(winning_group(&votes, &json!(label)).len() <= winners);
            }
        }
    }
}

// ── Property: highest-confidence returns the max ───────────────────

#[test]
fn prop_highest_confidence_is_max() {
    for count in [1, 3, 9, 20] {
        let votes = make_votes(count, 3, 4);
        let weights = make_weights(count, 2);
        let decision = aggregate(&votes, &weights, EnsembleMethod::HighestConfidence);

        let max = votes.iter().map(|v| v.confidence).fold(f64::MIN, f64::max);
        assert_eq!(decision.confidence, max);
    }
}

// ── Property: empty vote sets never decide ─────────────────────────

#[test]
fn prop_empty_votes_never_decide() {
    for method in EnsembleMethod::all() {
        for seed in 0..3 {
            let decision = aggregate(&[], &make_weights(3, seed), *method);
            assert!(decision.is_no_result());
            assert_eq!(decision.confidence, 0.0);
        }
    }
}

// ── Property: registry weights stay in [0, 1] ──────────────────────

#[test]
fn prop_registry_weights_bounded() {
    let inputs = [
        -5.0,
        -0.0,
        0.0,
        0.25,
        1.0,
        1.0000001,
        42.0,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NAN,
    ];

    let mut registry = EngineRegistry::new();
    for (i, weight) in inputs.iter().enumerate() {
        let name = format!("engine-{}", i);
        registry.register(
            name.clone(),
            EngineHandle::predictor(LabelEngine::new("a")),
            Some(*weight),
        );
        for update in inputs {
            registry.set_weight(&name, update);
            let current = registry.weight(&name).unwrap();
            assert!((0.0..=1.0).contains(&current), "{} -> {}", update, current);
        }
    }

    for weight in inputs {
        let clamped = clamp_weight(weight);
        assert!((0.0..=1.0).contains(&clamped));
    }
}
