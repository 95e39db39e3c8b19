//! User-correction feedback
//!
//! Corrections enter a queue when submitted. Distribution hands each one to the
//! engines that contributed to the original prediction, then moves it to an
//! append-only history. Only the queue is persisted.

pub mod store;
pub mod types;

pub use store::FeedbackStore;
pub use types::{FeedbackEntry, FeedbackId};
