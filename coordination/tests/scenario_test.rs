//! End-to-end scenarios through the public coordinator API.
//!
//! Three engines, X (weight 1.0), Y (0.9), and Z (0.8), answer a seniority
//! question with "Senior" 0.9, "Lead" 0.8, and "Senior" 0.7.

use std::sync::Arc;

use ensemble_feedback::testing::ScriptedEngine;
use ensemble_feedback::{
    Coordinator, CoordinatorConfig, CoordinatorEvent, EngineHandle, EnsembleMethod,
    PredictOptions, ResultFlag,
};
use serde_json::{json, Map};

fn config(method: EnsembleMethod) -> CoordinatorConfig {
    CoordinatorConfig {
        ensemble_method: method,
        auto_distribute_feedback: false,
        ..Default::default()
    }
}

/// Register X, Y, Z and return their engines for call inspection
async fn register_xyz(coordinator: &Coordinator) -> Vec<Arc<ScriptedEngine>> {
    let mut engines = Vec::new();
    for (name, label, confidence, weight) in [
        ("X", "Senior", 0.9, 1.0),
        ("Y", "Lead", 0.8, 0.9),
        ("Z", "Senior", 0.7, 0.8),
    ] {
        let engine = Arc::new(ScriptedEngine::new(label, confidence));
        coordinator
            .register_engine(name, EngineHandle::learning_shared(engine.clone()), Some(weight))
            .await;
        engines.push(engine);
    }
    engines
}

// ── Scenario A: weighted vote ──────────────────────────────────────

#[tokio::test]
async fn scenario_a_weighted_vote() {
    let coordinator = Coordinator::in_memory(config(EnsembleMethod::WeightedVote));
    register_xyz(&coordinator).await;

    let result = coordinator
        .ensemble_predict(&json!({"title": "Staff Engineer"}), "seniority")
        .await;

    assert_eq!(result.prediction, Some(json!("Senior")));
    // 1.0*0.9 + 0.8*0.7
    assert!((result.score - 1.46).abs() < 1e-9, "score {}", result.score);
    // mean(0.9, 0.7)
    assert!((result.confidence - 0.8).abs() < 1e-9);
    assert_eq!(result.strategy_used, EnsembleMethod::WeightedVote);

    let voters: Vec<&str> = result.votes.iter().map(|v| v.engine_name.as_str()).collect();
    assert_eq!(voters, vec!["X", "Y", "Z"]);
}

// ── Scenario B: majority vote ──────────────────────────────────────

#[tokio::test]
async fn scenario_b_majority_vote() {
    let coordinator = Coordinator::in_memory(config(EnsembleMethod::MajorityVote));
    register_xyz(&coordinator).await;

    let result = coordinator.ensemble_predict(&json!({}), "seniority").await;

    assert_eq!(result.prediction, Some(json!("Senior")));
    assert!((result.confidence - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(result.strategy_used, EnsembleMethod::MajorityVote);
}

// ── Scenario C: highest confidence ─────────────────────────────────

#[tokio::test]
async fn scenario_c_highest_confidence() {
    let coordinator = Coordinator::in_memory(config(EnsembleMethod::HighestConfidence));
    register_xyz(&coordinator).await;

    let result = coordinator.ensemble_predict(&json!({}), "seniority").await;

    assert_eq!(result.prediction, Some(json!("Senior")));
    assert_eq!(result.confidence, 0.9);
    assert_eq!(result.strategy_used, EnsembleMethod::HighestConfidence);
}

// ── Scenario D: retrain threshold ──────────────────────────────────

#[tokio::test]
async fn scenario_d_retrain_at_threshold() {
    let coordinator = Coordinator::in_memory(CoordinatorConfig {
        retrain_threshold: 100,
        ..config(EnsembleMethod::WeightedVote)
    });
    let engines = register_xyz(&coordinator).await;
    let mut rx = coordinator.subscribe();

    for i in 0..99 {
        coordinator
            .submit_feedback(json!("Senior"), json!(format!("label-{}", i)), Map::new(), None)
            .await;
    }
    assert_eq!(coordinator.queued_feedback().await.len(), 99);
    assert!(engines.iter().all(|e| e.retrain_calls() == 0));

    coordinator
        .submit_feedback(json!("Senior"), json!("Lead"), Map::new(), None)
        .await;

    for engine in &engines {
        assert_eq!(engine.retrain_calls(), 1);
        // Auto-distribution is off, so no hook saw any correction
        assert_eq!(engine.feedback_calls(), 0);
    }
    assert!(coordinator.queued_feedback().await.is_empty());
    assert_eq!(coordinator.get_performance_report().await.retrain_count, 1);

    let mut retrain_events = 0;
    while let Ok(event) = rx.try_recv() {
        if let CoordinatorEvent::RetrainTriggered {
            queue_len,
            signalled,
            ..
        } = event
        {
            assert_eq!(queue_len, 100);
            assert_eq!(signalled, vec!["X", "Y", "Z"]);
            retrain_events += 1;
        }
    }
    assert_eq!(retrain_events, 1);
}

#[tokio::test]
async fn scenario_d_retrain_disabled_at_zero() {
    let coordinator = Coordinator::in_memory(CoordinatorConfig {
        retrain_threshold: 0,
        ..config(EnsembleMethod::WeightedVote)
    });
    let engines = register_xyz(&coordinator).await;

    for _ in 0..5 {
        coordinator
            .submit_feedback(json!("a"), json!("b"), Map::new(), None)
            .await;
    }
    assert_eq!(coordinator.queued_feedback().await.len(), 5);
    assert!(engines.iter().all(|e| e.retrain_calls() == 0));
}

// ── Scenario E: no engines ─────────────────────────────────────────

#[tokio::test]
async fn scenario_e_no_engines() {
    for method in EnsembleMethod::all() {
        let coordinator = Coordinator::in_memory(config(*method));
        let result = coordinator.ensemble_predict(&json!({}), "seniority").await;

        assert!(!result.is_decided());
        assert_eq!(result.prediction, None);
        assert_eq!(result.confidence, 0.0);
        assert!(result.votes.is_empty());
        assert_eq!(result.flag, Some(ResultFlag::NoEnginesSelected));
        assert_eq!(result.strategy_used, *method);
    }
}

#[tokio::test]
async fn scenario_e_filter_matches_nothing() {
    let coordinator = Coordinator::in_memory(config(EnsembleMethod::WeightedVote));
    let engines = register_xyz(&coordinator).await;

    let result = coordinator
        .ensemble_predict_with(
            &json!({}),
            "seniority",
            PredictOptions::default().with_engines(["nobody"]),
        )
        .await;

    assert_eq!(result.flag, Some(ResultFlag::NoEnginesSelected));
    assert!(engines.iter().all(|e| e.predict_calls() == 0));
}
