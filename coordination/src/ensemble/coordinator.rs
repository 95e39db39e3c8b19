//! Ensemble coordinator - orchestrates prediction, feedback, and learning
//!
//! The coordinator owns every piece of mutable state (registry, feedback
//! queue, performance counters, retrain trigger) behind one async mutex.
//! No engine call runs under the lock. Prediction snapshots the registry,
//! distribution claims its entry before calling feedback hooks, and retrain
//! clears the queue before signalling, so each correction is delivered at
//! most once and a slow hook never stalls other callers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CoordinatorConfig, EnsembleMethod};
use crate::engine::{EngineError, EngineHandle, EngineResult, FeedbackPayload};
use crate::events::{CoordinatorEvent, EventBus, SharedEventBus, WeightChangeReason};
use crate::feedback::{FeedbackEntry, FeedbackId, FeedbackStore};
use crate::performance::{EngineReport, PerformanceReport, PerformanceTracker, PerformanceUpdate};
use crate::registry::{EngineRegistry, EngineSummary, Registration};
use crate::retrain::{RetrainCoordinator, RetrainReport};
use crate::state::{
    EnginePerformanceDocument, FeedbackQueueDocument, MemoryStore, Persistence,
    PersistenceError, SharedDocumentStore, ENGINE_PERFORMANCE_KEY, FEEDBACK_QUEUE_KEY,
};

use super::types::{EngineFailure, EnsembleResult, RecordedVote, ResultFlag, Vote};
use super::voting::{self, same_prediction};

/// Error type for coordinator operations
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Feedback not found in queue: {0}")]
    FeedbackNotFound(FeedbackId),

    #[error("Engine not registered: {0}")]
    EngineNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Shared reference to Coordinator
pub type SharedCoordinator = Arc<Coordinator>;

/// Per-call overrides for [`Coordinator::ensemble_predict_with`]
#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    /// Restrict the vote to these engines; unknown names are ignored
    pub engines: Option<Vec<String>>,
    pub strategy: Option<EnsembleMethod>,
    /// Per-engine timeout, defaulting to `engine_timeout_ms`
    pub timeout: Option<Duration>,
    /// Stop waiting on engines still running; returned votes are kept
    pub cancel: Option<CancellationToken>,
}

impl PredictOptions {
    pub fn with_engines<I, S>(mut self, engines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.engines = Some(engines.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_strategy(mut self, strategy: EnsembleMethod) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What happened to one correction during distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionReport {
    /// The archived entry, with `processed` set
    pub entry: FeedbackEntry,
    /// Involved engines that are unregistered or have no feedback hook
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Engines whose recorded vote was scored against the correction
    pub scored: Vec<String>,
}

/// Everything mutated by submit, distribute, and record
#[derive(Debug)]
struct CoordinatorState {
    registry: EngineRegistry,
    feedback: FeedbackStore,
    performance: PerformanceTracker,
    retrain: RetrainCoordinator,
    submissions_since_save: usize,
}

/// Central orchestrator for ensemble prediction and feedback learning
pub struct Coordinator {
    config: CoordinatorConfig,
    persistence: Persistence,
    events: SharedEventBus,
    state: Mutex<CoordinatorState>,
}

impl Coordinator {
    /// Create a coordinator, restoring queue, counters, and weights from `store`
    pub fn new(config: CoordinatorConfig, store: SharedDocumentStore) -> Self {
        Self::with_event_bus(config, store, EventBus::new().shared())
    }

    /// Create a coordinator publishing on an existing event bus
    pub fn with_event_bus(
        config: CoordinatorConfig,
        store: SharedDocumentStore,
        events: SharedEventBus,
    ) -> Self {
        for issue in config.validate() {
            warn!("Coordinator config: {}", issue);
        }

        let persistence = Persistence::new(store);
        let queue_doc = persistence.load_feedback_queue();
        let perf_doc = persistence.load_engine_performance();

        let mut registry = EngineRegistry::new();
        registry.restore_weights(&perf_doc.engine_weights);

        let mut feedback = FeedbackStore::new(config.max_queue_size);
        feedback.restore(queue_doc.queue);

        let mut performance = PerformanceTracker::new();
        performance.restore(perf_doc.engine_performance);

        info!(
            method = %config.ensemble_method,
            queued = feedback.queue_len(),
            engines_tracked = performance.len(),
            weights_restored = perf_doc.engine_weights.len(),
            "Coordinator initialized"
        );

        let state = CoordinatorState {
            registry,
            feedback,
            performance,
            retrain: RetrainCoordinator::new(config.retrain_threshold),
            submissions_since_save: 0,
        };

        Self {
            config,
            persistence,
            events,
            state: Mutex::new(state),
        }
    }

    /// Coordinator backed by a fresh [`MemoryStore`]
    pub fn in_memory(config: CoordinatorConfig) -> Self {
        Self::new(config, MemoryStore::new().shared())
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedCoordinator {
        Arc::new(self)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> SharedEventBus {
        self.events.clone()
    }

    // =========================================================================
    // Engine Registry
    // =========================================================================

    /// Register an engine, or replace the handle of one with the same name
    pub async fn register_engine(
        &self,
        name: impl Into<String>,
        handle: EngineHandle,
        initial_weight: Option<f64>,
    ) -> Registration {
        let name = name.into();
        let mut state = self.state.lock().await;

        let registration = state.registry.register(name.clone(), handle, initial_weight);
        let weight = state.registry.weight(&name).unwrap_or_default();

        self.events.publish(CoordinatorEvent::EngineRegistered {
            engine: name,
            registration,
            weight,
            timestamp: Utc::now(),
        });
        self.persist_performance(&state);

        registration
    }

    /// Override an engine's weight, returning the previous value
    pub async fn set_engine_weight(&self, name: &str, weight: f64) -> CoordinatorResult<f64> {
        let mut state = self.state.lock().await;

        let previous = state
            .registry
            .set_weight(name, weight)
            .ok_or_else(|| CoordinatorError::EngineNotFound(name.to_string()))?;
        let weight = state.registry.weight(name).unwrap_or_default();

        info!(engine = %name, previous, weight, "Engine weight set by admin");
        self.events.publish(CoordinatorEvent::WeightAdjusted {
            engine: name.to_string(),
            previous,
            weight,
            reason: WeightChangeReason::Admin,
            timestamp: Utc::now(),
        });
        self.persist_performance(&state);

        Ok(previous)
    }

    pub async fn engine_weight(&self, name: &str) -> Option<f64> {
        self.state.lock().await.registry.weight(name)
    }

    pub async fn engine_weights(&self) -> BTreeMap<String, f64> {
        self.state.lock().await.registry.weights()
    }

    /// Registered engines in registration order
    pub async fn registered_engines(&self) -> Vec<EngineSummary> {
        self.state.lock().await.registry.summaries()
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Ask every registered engine and combine the votes under the configured
    /// method
    pub async fn ensemble_predict(&self, input: &Value, task: &str) -> EnsembleResult {
        self.ensemble_predict_with(input, task, PredictOptions::default())
            .await
    }

    /// [`Coordinator::ensemble_predict`] with per-call overrides
    pub async fn ensemble_predict_with(
        &self,
        input: &Value,
        task: &str,
        options: PredictOptions,
    ) -> EnsembleResult {
        let strategy = options.strategy.unwrap_or(self.config.ensemble_method);
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.engine_timeout());

        // Snapshot, then release the lock before calling engines
        let (engines, weights) = {
            let state = self.state.lock().await;
            (
                state.registry.handles(options.engines.as_deref()),
                state.registry.snapshot(),
            )
        };

        if engines.is_empty() {
            warn!(task, %strategy, "No engines selected for ensemble prediction");
            let result = EnsembleResult::no_result(
                strategy,
                ResultFlag::NoEnginesSelected,
                Vec::new(),
                Vec::new(),
            );
            self.publish_decision(&result);
            return result;
        }

        let cancel = options.cancel.as_ref();
        let outcomes = join_all(
            engines
                .iter()
                .map(|(name, handle)| collect_vote(name, handle, input, task, timeout, cancel)),
        )
        .await;

        let mut votes = Vec::with_capacity(engines.len());
        let mut failures = Vec::new();
        for ((name, _), outcome) in engines.iter().zip(outcomes) {
            match outcome {
                Ok(vote) => votes.push(vote),
                Err(e) => {
                    warn!(engine = %name, task, "Engine excluded from vote: {}", e);
                    self.events.publish(CoordinatorEvent::EngineUnavailable {
                        engine: name.clone(),
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    failures.push(EngineFailure {
                        engine_name: name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let threshold = self.config.min_confidence_threshold;
        let below_threshold = voting::below_threshold(&votes, threshold);
        let decision = if self.config.filter_below_threshold {
            let counted: Vec<Vote> = votes
                .iter()
                .filter(|v| v.confidence >= threshold)
                .cloned()
                .collect();
            voting::aggregate(&counted, &weights, strategy)
        } else {
            voting::aggregate(&votes, &weights, strategy)
        };

        let result = if decision.is_no_result() {
            warn!(
                task,
                %strategy,
                failed = failures.len(),
                below_threshold = below_threshold.len(),
                "No votes collected"
            );
            let mut result =
                EnsembleResult::no_result(strategy, ResultFlag::NoVotesCollected, votes, failures);
            result.below_threshold = below_threshold;
            result
        } else {
            EnsembleResult {
                prediction: decision.prediction,
                confidence: decision.confidence,
                strategy_used: strategy,
                votes,
                timestamp: Utc::now(),
                score: decision.score,
                flag: None,
                below_threshold,
                failures,
            }
        };

        info!(
            task,
            %strategy,
            votes = result.votes.len(),
            failed = result.failures.len(),
            confidence = result.confidence,
            "Ensemble prediction complete"
        );
        self.publish_decision(&result);

        result
    }

    fn publish_decision(&self, result: &EnsembleResult) {
        self.events.publish(CoordinatorEvent::EnsembleDecided {
            strategy: result.strategy_used,
            decided: result.is_decided(),
            confidence: result.confidence,
            votes: result.votes.len(),
            timestamp: result.timestamp,
        });
    }

    // =========================================================================
    // Feedback
    // =========================================================================

    /// Queue a user correction.
    ///
    /// `engines_involved` of `None` means every engine registered right now.
    /// With auto-distribution on, the entry is distributed before this returns.
    /// The retrain check runs last. With the default
    /// `auto_distribute_feedback = true` each submission has drained its own
    /// entry by then, so the threshold is only reached by entries still queued
    /// from elsewhere (restored from disk, or submitted while auto-distribution
    /// was off).
    pub async fn submit_feedback(
        &self,
        original_prediction: Value,
        user_correction: Value,
        context: Map<String, Value>,
        engines_involved: Option<Vec<String>>,
    ) -> FeedbackId {
        let id = {
            let mut state = self.state.lock().await;
            let engines = engines_involved.unwrap_or_else(|| state.registry.names());
            let entry = FeedbackEntry::new(original_prediction, user_correction, context, engines);
            let id = entry.id.clone();

            info!(
                feedback_id = %id,
                engines = entry.engines_involved.len(),
                queued = state.feedback.queue_len() + 1,
                "Feedback submitted"
            );
            self.events.publish(CoordinatorEvent::FeedbackSubmitted {
                feedback_id: id.clone(),
                engines_involved: entry.engines_involved.clone(),
                timestamp: entry.timestamp,
            });
            state.feedback.enqueue(entry);
            id
        };

        if self.config.auto_distribute_feedback {
            // A concurrent distribute or retrain may have claimed the entry first
            if let Err(e) = self.distribute_feedback(&id).await {
                warn!(feedback_id = %id, "Auto-distribution skipped: {}", e);
            }
        }

        self.check_retrain().await;

        let mut state = self.state.lock().await;
        state.submissions_since_save += 1;
        let interval = self.config.save_interval;
        if interval > 0 && state.submissions_since_save >= interval {
            debug!(submissions = state.submissions_since_save, "Periodic save");
            self.persist_all(&state);
            state.submissions_since_save = 0;
        }

        id
    }

    /// Hand a queued correction to its engines' feedback hooks, score their
    /// recorded votes, and archive it.
    ///
    /// The entry is claimed under the lock and the hooks run outside it, each
    /// bounded by `engine_timeout_ms`. Ids that were already claimed, dropped
    /// by a retrain, or never existed return
    /// [`CoordinatorError::FeedbackNotFound`] without running any hook.
    pub async fn distribute_feedback(&self, id: &str) -> CoordinatorResult<DistributionReport> {
        let (entry, targets, skipped) = {
            let mut state = self.state.lock().await;
            let entry = state
                .feedback
                .take_queued(id)
                .ok_or_else(|| CoordinatorError::FeedbackNotFound(id.to_string()))?;

            let mut targets = Vec::new();
            let mut skipped = Vec::new();
            for engine in &entry.engines_involved {
                match state.registry.get(engine).map(|e| e.handle.clone()) {
                    None => {
                        debug!(feedback_id = %id, engine = %engine, "Involved engine not registered, skipping");
                        skipped.push(engine.clone());
                    }
                    Some(handle) if handle.feedback_sink().is_none() => {
                        debug!(feedback_id = %id, engine = %engine, "Engine has no feedback capability, skipping");
                        skipped.push(engine.clone());
                    }
                    Some(handle) => targets.push((engine.clone(), handle)),
                }
            }
            (entry, targets, skipped)
        };

        let payload = entry.payload();
        let timeout = self.config.engine_timeout();
        let outcomes = join_all(
            targets
                .iter()
                .map(|(_, handle)| deliver_feedback(handle, id, &payload, timeout)),
        )
        .await;

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for ((engine, _), outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    debug!(feedback_id = %id, engine = %engine, "Feedback delivered");
                    delivered.push(engine.clone());
                }
                Err(e) => {
                    warn!(feedback_id = %id, engine = %engine, "Feedback hook failed: {}", e);
                    failed.push((engine.clone(), e.to_string()));
                }
            }
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let recorded = RecordedVote::from_context(&entry.context);
        let mut scored = Vec::new();
        for engine in &entry.engines_involved {
            let Some(vote) = recorded.iter().find(|v| &v.engine_name == engine) else {
                continue;
            };
            let was_correct = same_prediction(&vote.prediction, &entry.user_correction);
            self.apply_performance(state, engine, was_correct, vote.confidence);
            scored.push(engine.clone());
        }

        let archived = state.feedback.archive(entry, &delivered);

        info!(
            feedback_id = %id,
            delivered = archived.distributed_to.len(),
            skipped = skipped.len(),
            failed = failed.len(),
            scored = scored.len(),
            "Feedback distributed"
        );
        self.events.publish(CoordinatorEvent::FeedbackDistributed {
            feedback_id: id.to_string(),
            distributed_to: archived.distributed_to.clone(),
            timestamp: Utc::now(),
        });
        self.persist_all(state);

        Ok(DistributionReport {
            entry: archived,
            skipped,
            failed,
            scored,
        })
    }

    /// Clear the queue under the lock once it reaches the threshold, then
    /// signal every engine outside it
    async fn check_retrain(&self) -> Option<RetrainReport> {
        let (queue_len, engines) = {
            let mut state = self.state.lock().await;
            let queue_len = state.feedback.queue_len();
            if !state.retrain.fire(queue_len) {
                return None;
            }

            let engines = state.registry.handles(None);
            let dropped = state.feedback.clear_queue();
            info!(queue_len, dropped = dropped.len(), "Feedback queue cleared for retraining");
            self.persist_queue(&state);
            (queue_len, engines)
        };

        let report =
            RetrainCoordinator::signal(queue_len, &engines, self.config.engine_timeout()).await;

        info!(
            queue_len,
            signalled = report.signalled.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Retrain triggered"
        );
        self.events.publish(CoordinatorEvent::RetrainTriggered {
            queue_len,
            signalled: report.signalled.clone(),
            timestamp: Utc::now(),
        });

        Some(report)
    }

    pub async fn queued_feedback(&self) -> Vec<FeedbackEntry> {
        self.state.lock().await.feedback.queue().to_vec()
    }

    /// Distributed entries since startup; history is not persisted
    pub async fn feedback_history(&self) -> Vec<FeedbackEntry> {
        self.state.lock().await.feedback.history().to_vec()
    }

    // =========================================================================
    // Performance
    // =========================================================================

    /// Record one scored prediction. Once an engine has enough history its
    /// registry weight follows its accuracy.
    pub async fn update_engine_performance(
        &self,
        engine: &str,
        was_correct: bool,
        confidence: f64,
    ) -> PerformanceUpdate {
        let mut guard = self.state.lock().await;
        let update = self.apply_performance(&mut guard, engine, was_correct, confidence);
        self.persist_performance(&guard);
        update
    }

    fn apply_performance(
        &self,
        state: &mut CoordinatorState,
        engine: &str,
        was_correct: bool,
        confidence: f64,
    ) -> PerformanceUpdate {
        let update = state.performance.record(engine, was_correct, confidence);

        if let Some(weight) = update.auto_weight {
            if let Some(previous) = state.registry.set_weight(engine, weight) {
                if (previous - weight).abs() > f64::EPSILON {
                    info!(
                        engine,
                        previous,
                        weight,
                        total = update.performance.total_predictions,
                        "Engine weight tracks accuracy"
                    );
                    self.events.publish(CoordinatorEvent::WeightAdjusted {
                        engine: engine.to_string(),
                        previous,
                        weight,
                        reason: WeightChangeReason::Accuracy,
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        update
    }

    /// Snapshot of weights, counters, and queue sizes.
    ///
    /// Registered engines come first in registration order, followed by
    /// engines known only from persisted counters.
    pub async fn get_performance_report(&self) -> PerformanceReport {
        let (summaries, performance, queue_len, history_len, retrain_count) = {
            let state = self.state.lock().await;
            (
                state.registry.summaries(),
                state.performance.all().clone(),
                state.feedback.queue_len(),
                state.feedback.history_len(),
                state.retrain.triggers(),
            )
        };

        let mut engines: Vec<EngineReport> = summaries
            .iter()
            .map(|s| EngineReport {
                name: s.name.clone(),
                weight: Some(s.weight),
                capabilities: Some(s.capabilities),
                performance: performance.get(&s.name).cloned().unwrap_or_default(),
            })
            .collect();

        engines.extend(
            performance
                .into_iter()
                .filter(|(name, _)| !summaries.iter().any(|s| &s.name == name))
                .map(|(name, performance)| EngineReport {
                    name,
                    weight: None,
                    capabilities: None,
                    performance,
                }),
        );

        PerformanceReport {
            generated_at: Utc::now(),
            ensemble_method: self.config.ensemble_method,
            engines,
            queue_len,
            history_len,
            retrain_count,
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write both documents now, returning the first failure
    pub async fn flush(&self) -> CoordinatorResult<()> {
        let mut state = self.state.lock().await;
        self.persistence
            .save_feedback_queue(&queue_document(&state))?;
        self.persistence
            .save_engine_performance(&performance_document(&state))?;
        state.submissions_since_save = 0;
        debug!("Coordinator state flushed");
        Ok(())
    }

    fn persist_all(&self, state: &CoordinatorState) {
        self.persist_queue(state);
        self.persist_performance(state);
    }

    fn persist_queue(&self, state: &CoordinatorState) {
        if let Err(e) = self.persistence.save_feedback_queue(&queue_document(state)) {
            self.persistence_failed(FEEDBACK_QUEUE_KEY, e);
        }
    }

    fn persist_performance(&self, state: &CoordinatorState) {
        if let Err(e) = self
            .persistence
            .save_engine_performance(&performance_document(state))
        {
            self.persistence_failed(ENGINE_PERFORMANCE_KEY, e);
        }
    }

    /// In-memory state stays authoritative; the next save retries
    fn persistence_failed(&self, document: &str, e: PersistenceError) {
        error!(document, "Failed to persist document: {}", e);
        self.events.publish(CoordinatorEvent::PersistenceFailed {
            document: document.to_string(),
            error: e.to_string(),
            timestamp: Utc::now(),
        });
    }
}

fn queue_document(state: &CoordinatorState) -> FeedbackQueueDocument {
    FeedbackQueueDocument::new(state.feedback.queue().to_vec())
}

fn performance_document(state: &CoordinatorState) -> EnginePerformanceDocument {
    EnginePerformanceDocument::new(
        state.performance.all().clone(),
        state.registry.persisted_weights(),
    )
}

/// Run one engine's feedback hook under `timeout`
async fn deliver_feedback(
    handle: &EngineHandle,
    id: &str,
    payload: &FeedbackPayload,
    timeout: Duration,
) -> EngineResult<()> {
    let Some(sink) = handle.feedback_sink() else {
        return Err(EngineError::Unavailable("no feedback capability".to_string()));
    };
    tokio::time::timeout(timeout, sink.process_feedback(id, payload))
        .await
        .map_err(|_| EngineError::Timeout(timeout))?
}

/// Call one engine under its timeout, racing the caller's cancellation token
async fn collect_vote(
    name: &str,
    handle: &EngineHandle,
    input: &Value,
    task: &str,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> EngineResult<Vote> {
    let call = tokio::time::timeout(timeout, handle.prediction().predict_with_confidence(input, task));

    let outcome = match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => return Err(EngineError::Cancelled),
            outcome = call => outcome,
        },
        None => call.await,
    };

    let output = outcome.map_err(|_| EngineError::Timeout(timeout))??;
    if !output.confidence.is_finite() {
        return Err(EngineError::InvalidConfidence(output.confidence));
    }

    let mut vote = Vote::from_prediction(name, output);
    vote.confidence = vote.confidence.clamp(0.0, 1.0);
    debug!(engine = %name, confidence = vote.confidence, "Vote collected");
    Ok(vote)
}
