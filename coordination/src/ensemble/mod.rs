//! Ensemble prediction and feedback coordination
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       Coordinator                          │
//! │  • ensemble_predict: fan out, collect votes, aggregate     │
//! │  • submit/distribute feedback, score recorded votes        │
//! │  • retrain trigger, persistence, events                    │
//! └─────────────────────────┬─────────────────────────────────┘
//!                           │
//!           ┌───────────────┼───────────────┐
//!           ▼               ▼               ▼
//!     ┌───────────┐   ┌───────────┐   ┌───────────┐
//!     │  Engine   │   │  Voting   │   │ Feedback  │
//!     │ Registry  │   │           │   │  Store    │
//!     └───────────┘   └───────────┘   └───────────┘
//! ```
//!
//! # Workflow
//!
//! 1. Engines register with an initial weight (or a restored one)
//! 2. `ensemble_predict` calls every selected engine concurrently; failures
//!    and timeouts are excluded from the vote
//! 3. Votes are combined by weighted vote, majority vote, or highest confidence
//! 4. A user correction is submitted with the result's vote trail
//! 5. Distribution feeds it to each engine and scores every recorded vote
//! 6. Engines with enough history vote with a weight equal to their accuracy
//!
//! # Usage
//!
//! ```ignore
//! use ensemble_feedback::ensemble::Coordinator;
//! use ensemble_feedback::config::CoordinatorConfig;
//! use ensemble_feedback::state::JsonFileStore;
//!
//! let store = JsonFileStore::new("./ensemble-state").shared();
//! let coordinator = Coordinator::new(CoordinatorConfig::from_env(), store).shared();
//!
//! coordinator.register_engine("bayes", EngineHandle::learning(bayes), Some(0.9)).await;
//!
//! let result = coordinator.ensemble_predict(&input, "seniority").await;
//! let id = coordinator
//!     .submit_feedback(result.prediction.clone().unwrap_or_default(), correction, result.feedback_context(), None)
//!     .await;
//! ```

pub mod coordinator;
pub mod types;
pub mod voting;

pub use coordinator::{
    Coordinator, CoordinatorError, CoordinatorResult, DistributionReport, PredictOptions,
    SharedCoordinator,
};
pub use types::{EngineFailure, EnsembleResult, RecordedVote, ResultFlag, Vote};
pub use voting::{aggregate, Decision, PredictionKey};
