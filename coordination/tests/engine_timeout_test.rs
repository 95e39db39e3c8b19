//! Slow, failing, and cancelled engines during `ensemble_predict`.
//!
//! Runs on paused Tokio time so timeouts resolve without real waiting.

use std::sync::Arc;
use std::time::Duration;

use ensemble_feedback::testing::ScriptedEngine;
use ensemble_feedback::{
    Coordinator, CoordinatorConfig, EngineHandle, EnsembleMethod, PredictOptions, ResultFlag,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn coordinator_with(engines: Vec<(&str, ScriptedEngine)>) -> Coordinator {
    let coordinator = Coordinator::in_memory(CoordinatorConfig {
        engine_timeout_ms: 1_000,
        ..Default::default()
    });
    for (name, engine) in engines {
        coordinator
            .register_engine(name, EngineHandle::learning(engine), None)
            .await;
    }
    coordinator
}

#[tokio::test(start_paused = true)]
async fn test_slow_engine_times_out() {
    let coordinator = coordinator_with(vec![
        ("fast", ScriptedEngine::new("Senior", 0.6)),
        (
            "slow",
            ScriptedEngine::new("Lead", 0.99).with_delay(Duration::from_secs(60)),
        ),
    ])
    .await;

    let result = coordinator.ensemble_predict(&json!({}), "seniority").await;

    assert_eq!(result.prediction, Some(json!("Senior")));
    assert_eq!(result.votes.len(), 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].engine_name, "slow");
    assert!(result.failures[0].reason.contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_per_call_timeout_override() {
    let coordinator = coordinator_with(vec![(
        "patient",
        ScriptedEngine::new("Lead", 0.7).with_delay(Duration::from_secs(5)),
    )])
    .await;

    let timed_out = coordinator.ensemble_predict(&json!({}), "seniority").await;
    assert_eq!(timed_out.flag, Some(ResultFlag::NoVotesCollected));
    assert_eq!(timed_out.confidence, 0.0);

    let options = PredictOptions::default().with_timeout(Duration::from_secs(10));
    let result = coordinator
        .ensemble_predict_with(&json!({}), "seniority", options)
        .await;
    assert_eq!(result.prediction, Some(json!("Lead")));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_keeps_returned_votes() {
    let coordinator = Coordinator::in_memory(CoordinatorConfig {
        engine_timeout_ms: 30_000,
        ..Default::default()
    });
    let slow = Arc::new(ScriptedEngine::new("Lead", 0.95).with_delay(Duration::from_secs(10)));
    coordinator
        .register_engine("fast", EngineHandle::learning(ScriptedEngine::new("Senior", 0.5)), None)
        .await;
    coordinator
        .register_engine("slow", EngineHandle::learning_shared(slow.clone()), None)
        .await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let options = PredictOptions::default()
        .with_strategy(EnsembleMethod::HighestConfidence)
        .with_cancellation(token);
    let result = coordinator
        .ensemble_predict_with(&json!({}), "seniority", options)
        .await;

    assert_eq!(result.prediction, Some(json!("Senior")));
    assert_eq!(result.confidence, 0.5);
    assert_eq!(slow.predict_calls(), 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].engine_name, "slow");
    assert!(result.failures[0].reason.contains("cancelled"));
}

#[tokio::test]
async fn test_pre_cancelled_token_yields_no_votes() {
    let coordinator = coordinator_with(vec![("fast", ScriptedEngine::new("Senior", 0.6))]).await;

    let token = CancellationToken::new();
    token.cancel();
    let result = coordinator
        .ensemble_predict_with(
            &json!({}),
            "seniority",
            PredictOptions::default().with_cancellation(token),
        )
        .await;

    assert!(!result.is_decided());
    assert_eq!(result.flag, Some(ResultFlag::NoVotesCollected));
}

#[tokio::test]
async fn test_invalid_confidence_is_excluded() {
    let coordinator = coordinator_with(vec![
        ("nan", ScriptedEngine::new("Lead", f64::NAN)),
        ("ok", ScriptedEngine::new("Senior", 0.6)),
        ("loud", ScriptedEngine::new("Senior", 1.8)),
    ])
    .await;

    let result = coordinator.ensemble_predict(&json!({}), "seniority").await;

    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].engine_name, "nan");
    // Out-of-range confidence is clamped into [0, 1]
    let loud = result.votes.iter().find(|v| v.engine_name == "loud").unwrap();
    assert_eq!(loud.confidence, 1.0);
    assert!((result.confidence - 0.8).abs() < 1e-12);
}
