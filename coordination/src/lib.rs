//! Ensemble Feedback Library
//!
//! This library provides:
//! - Concurrent multi-engine prediction with weighted, majority, and
//!   highest-confidence vote aggregation
//! - A feedback queue that routes user corrections to the engines that
//!   produced the original prediction
//! - Per-engine accuracy and calibration tracking that drives voting weights
//! - Threshold-triggered bulk retraining
//! - JSON persistence of the queue, counters, and weights across restarts
//!
//! # Engines
//!
//! Every engine implements [`PredictionEngine`]. Engines that learn also
//! implement [`FeedbackSink`] and/or [`Retrainable`]; the capabilities are
//! captured once in an [`EngineHandle`] at registration.
//!
//! # Usage
//!
//! ```ignore
//! use ensemble_feedback::{Coordinator, CoordinatorConfig, EngineHandle, JsonFileStore};
//!
//! let coordinator = Coordinator::new(
//!     CoordinatorConfig::from_env(),
//!     JsonFileStore::new("./ensemble-state").shared(),
//! )
//! .shared();
//!
//! coordinator.register_engine("regression", EngineHandle::learning(regression), None).await;
//! coordinator.register_engine("keywords", EngineHandle::predictor(keywords), Some(0.6)).await;
//!
//! let result = coordinator.ensemble_predict(&job_posting, "seniority").await;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod engine;
pub mod ensemble;
pub mod events;
pub mod feedback;
pub mod performance;
pub mod registry;
pub mod retrain;
pub mod state;
pub mod testing;

// Re-export configuration types
pub use config::{ConfigError, CoordinatorConfig, EnsembleMethod};

// Re-export engine capability types
pub use engine::{
    EngineCapabilities, EngineError, EngineHandle, EnginePrediction, EngineResult,
    FeedbackPayload, FeedbackSink, PredictionEngine, Retrainable, FALLBACK_CONFIDENCE,
};

// Re-export key ensemble types
pub use ensemble::{
    Coordinator, CoordinatorError, CoordinatorResult, DistributionReport, EngineFailure,
    EnsembleResult, PredictOptions, RecordedVote, ResultFlag, SharedCoordinator, Vote,
};

// Re-export key event types
pub use events::{CoordinatorEvent, EventBus, SharedEventBus, WeightChangeReason};

// Re-export feedback types
pub use feedback::{FeedbackEntry, FeedbackId, FeedbackStore};

// Re-export performance types
pub use performance::{
    EnginePerformance, EngineReport, PerformanceReport, PerformanceTracker, PerformanceUpdate,
    AUTO_WEIGHT_MIN_PREDICTIONS,
};

// Re-export engine registry types
pub use registry::{EngineRegistry, EngineSummary, Registration, WeightSnapshot};

// Re-export retrain types
pub use retrain::{RetrainCoordinator, RetrainReport};

// Re-export key state types
pub use state::{
    DocumentStore, EnginePerformanceDocument, FeedbackQueueDocument, JsonFileStore, MemoryStore,
    Persistence, PersistenceError, PersistenceResult, SharedDocumentStore,
};
