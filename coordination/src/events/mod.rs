//! Coordinator telemetry events
//!
//! Every state transition the coordinator makes (registrations, weight changes,
//! votes, feedback, retraining, persistence failures) is published on an
//! [`EventBus`] for dashboards and tests to observe.

pub mod bus;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::{CoordinatorEvent, WeightChangeReason};
