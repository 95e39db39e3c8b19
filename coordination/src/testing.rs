//! Scripted engines for tests and demos

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::{
    EngineError, EnginePrediction, EngineResult, FeedbackPayload, FeedbackSink, PredictionEngine,
    Retrainable,
};

/// Engine with a fixed answer that records every hook call
#[derive(Debug)]
pub struct ScriptedEngine {
    prediction: Value,
    confidence: f64,
    delay: Option<Duration>,
    hook_delay: Option<Duration>,
    fail_predict: bool,
    fail_feedback: bool,
    fail_retrain: bool,
    predict_calls: AtomicUsize,
    retrain_calls: AtomicUsize,
    feedback: Mutex<Vec<(String, FeedbackPayload)>>,
}

impl ScriptedEngine {
    pub fn new(prediction: impl Into<Value>, confidence: f64) -> Self {
        Self {
            prediction: prediction.into(),
            confidence,
            delay: None,
            hook_delay: None,
            fail_predict: false,
            fail_feedback: false,
            fail_retrain: false,
            predict_calls: AtomicUsize::new(0),
            retrain_calls: AtomicUsize::new(0),
            feedback: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep inside the feedback and retrain hooks, after the call is counted
    pub fn with_hook_delay(mut self, delay: Duration) -> Self {
        self.hook_delay = Some(delay);
        self
    }

    async fn hook_pause(&self) {
        if let Some(delay) = self.hook_delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn failing_predictions(mut self) -> Self {
        self.fail_predict = true;
        self
    }

    pub fn failing_feedback(mut self) -> Self {
        self.fail_feedback = true;
        self
    }

    pub fn failing_retrain(mut self) -> Self {
        self.fail_retrain = true;
        self
    }

    pub fn predict_calls(&self) -> usize {
        self.predict_calls.load(Ordering::SeqCst)
    }

    pub fn retrain_calls(&self) -> usize {
        self.retrain_calls.load(Ordering::SeqCst)
    }

    /// Feedback hook invocations, including failed ones
    pub fn feedback_calls(&self) -> usize {
        self.received_feedback().len()
    }

    pub fn received_feedback(&self) -> Vec<(String, FeedbackPayload)> {
        self.feedback
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PredictionEngine for ScriptedEngine {
    async fn predict(&self, _input: &Value, _task: &str) -> EngineResult<Value> {
        self.predict_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_predict {
            return Err(EngineError::Unavailable("scripted failure".to_string()));
        }
        Ok(self.prediction.clone())
    }

    async fn predict_with_confidence(
        &self,
        input: &Value,
        task: &str,
    ) -> EngineResult<EnginePrediction> {
        let prediction = self.predict(input, task).await?;
        Ok(EnginePrediction::new(prediction, self.confidence).with_metadata("task", task))
    }
}

#[async_trait]
impl FeedbackSink for ScriptedEngine {
    async fn process_feedback(
        &self,
        prediction_id: &str,
        feedback: &FeedbackPayload,
    ) -> EngineResult<()> {
        if let Ok(mut calls) = self.feedback.lock() {
            calls.push((prediction_id.to_string(), feedback.clone()));
        }
        self.hook_pause().await;
        if self.fail_feedback {
            return Err(EngineError::Unavailable("feedback rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Retrainable for ScriptedEngine {
    async fn trigger_retraining(&self) -> EngineResult<()> {
        self.retrain_calls.fetch_add(1, Ordering::SeqCst);
        self.hook_pause().await;
        if self.fail_retrain {
            return Err(EngineError::Unavailable("retrain rejected".to_string()));
        }
        Ok(())
    }
}

/// Engine that only implements bare `predict`
#[derive(Debug, Clone)]
pub struct LabelEngine {
    label: Value,
}

impl LabelEngine {
    pub fn new(label: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl PredictionEngine for LabelEngine {
    async fn predict(&self, _input: &Value, _task: &str) -> EngineResult<Value> {
        Ok(self.label.clone())
    }
}
