//! Prediction engine capabilities
//!
//! Every registered engine must predict. Accepting corrections and retraining
//! are separate optional capabilities, captured once when the engine's
//! [`EngineHandle`] is built rather than probed on every call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Confidence assigned to engines that only implement [`PredictionEngine::predict`]
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Errors from engine capability calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine timed out after {0:?}")]
    Timeout(Duration),

    #[error("Engine call cancelled")]
    Cancelled,

    #[error("Engine returned invalid confidence: {0}")]
    InvalidConfidence(f64),
}

/// Result type for engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// One engine's answer for a single input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePrediction {
    pub prediction: Value,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EnginePrediction {
    pub fn new(prediction: impl Into<Value>, confidence: f64) -> Self {
        Self {
            prediction: prediction.into(),
            confidence,
            metadata: Map::new(),
        }
    }

    /// Prediction with the fixed fallback confidence and no metadata
    pub fn fallback(prediction: Value) -> Self {
        Self::new(prediction, FALLBACK_CONFIDENCE)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A user correction as delivered to an engine's feedback hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub original: Value,
    pub correction: Value,
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// Required capability: produce a prediction for an input
#[async_trait]
pub trait PredictionEngine: Send + Sync {
    /// Bare prediction without a confidence estimate
    async fn predict(&self, input: &Value, task: &str) -> EngineResult<Value>;

    /// Prediction with confidence and metadata.
    ///
    /// Engines that cannot estimate confidence keep this default, which reports
    /// [`FALLBACK_CONFIDENCE`] and empty metadata.
    async fn predict_with_confidence(
        &self,
        input: &Value,
        task: &str,
    ) -> EngineResult<EnginePrediction> {
        let prediction = self.predict(input, task).await?;
        Ok(EnginePrediction::fallback(prediction))
    }
}

/// Optional capability: learn from a user correction
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn process_feedback(
        &self,
        prediction_id: &str,
        feedback: &FeedbackPayload,
    ) -> EngineResult<()>;
}

/// Optional capability: rebuild the model from accumulated corrections
#[async_trait]
pub trait Retrainable: Send + Sync {
    async fn trigger_retraining(&self) -> EngineResult<()>;
}

/// Which capabilities a handle carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    pub feedback: bool,
    pub retraining: bool,
}

/// A registered engine's capability set
#[derive(Clone)]
pub struct EngineHandle {
    predictor: Arc<dyn PredictionEngine>,
    feedback: Option<Arc<dyn FeedbackSink>>,
    retrain: Option<Arc<dyn Retrainable>>,
}

impl EngineHandle {
    /// Handle for a prediction-only engine
    pub fn new(predictor: Arc<dyn PredictionEngine>) -> Self {
        Self {
            predictor,
            feedback: None,
            retrain: None,
        }
    }

    /// Wrap a prediction-only engine value
    pub fn predictor<E: PredictionEngine + 'static>(engine: E) -> Self {
        Self::new(Arc::new(engine))
    }

    /// Wrap an engine that implements every capability
    pub fn learning<E>(engine: E) -> Self
    where
        E: PredictionEngine + FeedbackSink + Retrainable + 'static,
    {
        Self::learning_shared(Arc::new(engine))
    }

    /// Like [`EngineHandle::learning`], for an engine the caller keeps a handle to
    pub fn learning_shared<E>(engine: Arc<E>) -> Self
    where
        E: PredictionEngine + FeedbackSink + Retrainable + 'static,
    {
        Self {
            predictor: engine.clone(),
            feedback: Some(engine.clone()),
            retrain: Some(engine),
        }
    }

    pub fn with_feedback(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(sink);
        self
    }

    pub fn with_retraining(mut self, hook: Arc<dyn Retrainable>) -> Self {
        self.retrain = Some(hook);
        self
    }

    pub fn prediction(&self) -> &dyn PredictionEngine {
        self.predictor.as_ref()
    }

    pub fn feedback_sink(&self) -> Option<&dyn FeedbackSink> {
        self.feedback.as_deref()
    }

    pub fn retrain_hook(&self) -> Option<&dyn Retrainable> {
        self.retrain.as_deref()
    }

    pub fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            feedback: self.feedback.is_some(),
            retraining: self.retrain.is_some(),
        }
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct LabelOnly;

    #[async_trait]
    impl PredictionEngine for LabelOnly {
        async fn predict(&self, _input: &Value, _task: &str) -> EngineResult<Value> {
            Ok(json!("Senior"))
        }
    }

    struct FullEngine;

    #[async_trait]
    impl PredictionEngine for FullEngine {
        async fn predict(&self, _input: &Value, _task: &str) -> EngineResult<Value> {
            Ok(json!("Lead"))
        }

        async fn predict_with_confidence(
            &self,
            input: &Value,
            task: &str,
        ) -> EngineResult<EnginePrediction> {
            let label = self.predict(input, task).await?;
            Ok(EnginePrediction::new(label, 0.8).with_metadata("model", "full"))
        }
    }

    #[async_trait]
    impl FeedbackSink for FullEngine {
        async fn process_feedback(&self, _id: &str, _feedback: &FeedbackPayload) -> EngineResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Retrainable for FullEngine {
        async fn trigger_retraining(&self) -> EngineResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_predict_only_engine_uses_fallback_confidence() {
        let handle = EngineHandle::predictor(LabelOnly);
        let out = handle
            .prediction()
            .predict_with_confidence(&json!({}), "seniority")
            .await
            .unwrap();

        assert_eq!(out.prediction, json!("Senior"));
        assert_eq!(out.confidence, FALLBACK_CONFIDENCE);
        assert!(out.metadata.is_empty());
        assert_eq!(
            handle.capabilities(),
            EngineCapabilities {
                feedback: false,
                retraining: false
            }
        );
        assert!(handle.feedback_sink().is_none());
        assert!(handle.retrain_hook().is_none());
    }

    #[tokio::test]
    async fn test_learning_engine_exposes_all_capabilities() {
        let handle = EngineHandle::learning(FullEngine);
        let out = handle
            .prediction()
            .predict_with_confidence(&json!({}), "seniority")
            .await
            .unwrap();

        assert_eq!(out.confidence, 0.8);
        assert_eq!(out.metadata.get("model"), Some(&json!("full")));
        assert!(handle.capabilities().feedback);
        assert!(handle.capabilities().retraining);
    }

    #[test]
    fn test_capabilities_added_separately() {
        let handle = EngineHandle::predictor(LabelOnly).with_retraining(Arc::new(FullEngine));
        assert!(!handle.capabilities().feedback);
        assert!(handle.capabilities().retraining);
        assert!(format!("{:?}", handle).contains("retraining: true"));
    }
}
