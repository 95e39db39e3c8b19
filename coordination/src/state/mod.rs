//! State persistence for the feedback coordinator
//!
//! Two JSON documents survive restarts:
//!
//! - `feedback_queue`: corrections not yet distributed
//! - `engine_performance`: per-engine counters and voting weights
//!
//! Both are written whole through a [`DocumentStore`]. [`JsonFileStore`] keeps
//! one file per document and replaces it with a temp-file rename;
//! [`MemoryStore`] keeps them in process.
//!
//! # Usage
//!
//! ```ignore
//! use ensemble_feedback::state::{JsonFileStore, Persistence};
//!
//! let persistence = Persistence::new(JsonFileStore::new("./ensemble-state").shared());
//! let queue = persistence.load_feedback_queue();
//! println!("{} corrections pending", queue.queue.len());
//! ```

pub mod documents;
pub mod store;

pub use documents::{
    EnginePerformanceDocument, FeedbackQueueDocument, Persistence, ENGINE_PERFORMANCE_KEY,
    FEEDBACK_QUEUE_KEY,
};
pub use store::{
    DocumentStore, JsonFileStore, MemoryStore, PersistenceError, PersistenceResult,
    SharedDocumentStore,
};
