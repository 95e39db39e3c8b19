//! Persisted documents and the typed load/save layer
//!
//! Loading never fails: a missing document starts empty, and a corrupt one is
//! logged and replaced with empty state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::feedback::FeedbackEntry;
use crate::performance::EnginePerformance;

use super::store::{PersistenceError, PersistenceResult, SharedDocumentStore};

/// Key of the feedback-queue document
pub const FEEDBACK_QUEUE_KEY: &str = "feedback_queue";

/// Key of the engine-performance document
pub const ENGINE_PERFORMANCE_KEY: &str = "engine_performance";

/// Pending corrections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackQueueDocument {
    pub queue: Vec<FeedbackEntry>,
    pub last_saved: DateTime<Utc>,
}

impl FeedbackQueueDocument {
    pub fn new(queue: Vec<FeedbackEntry>) -> Self {
        Self {
            queue,
            last_saved: Utc::now(),
        }
    }
}

impl Default for FeedbackQueueDocument {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Performance counters and voting weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePerformanceDocument {
    pub engine_performance: BTreeMap<String, EnginePerformance>,
    pub engine_weights: BTreeMap<String, f64>,
    pub last_saved: DateTime<Utc>,
}

impl EnginePerformanceDocument {
    pub fn new(
        engine_performance: BTreeMap<String, EnginePerformance>,
        engine_weights: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            engine_performance,
            engine_weights,
            last_saved: Utc::now(),
        }
    }
}

impl Default for EnginePerformanceDocument {
    fn default() -> Self {
        Self::new(BTreeMap::new(), BTreeMap::new())
    }
}

/// Typed access to the two coordinator documents
#[derive(Clone)]
pub struct Persistence {
    store: SharedDocumentStore,
}

impl Persistence {
    pub fn new(store: SharedDocumentStore) -> Self {
        Self { store }
    }

    pub fn load_feedback_queue(&self) -> FeedbackQueueDocument {
        self.load_or_default(FEEDBACK_QUEUE_KEY)
    }

    pub fn load_engine_performance(&self) -> EnginePerformanceDocument {
        self.load_or_default(ENGINE_PERFORMANCE_KEY)
    }

    pub fn save_feedback_queue(&self, doc: &FeedbackQueueDocument) -> PersistenceResult<()> {
        self.save(FEEDBACK_QUEUE_KEY, doc)
    }

    pub fn save_engine_performance(
        &self,
        doc: &EnginePerformanceDocument,
    ) -> PersistenceResult<()> {
        self.save(ENGINE_PERFORMANCE_KEY, doc)
    }

    /// Strict load: distinguishes missing, malformed, and I/O failures
    pub fn try_load<T: DeserializeOwned>(&self, key: &str) -> PersistenceResult<Option<T>> {
        let Some(raw) = self.store.read(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PersistenceError::Malformed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.try_load(key) {
            Ok(Some(doc)) => {
                debug!(document = key, "Loaded persisted document");
                doc
            }
            Ok(None) => {
                debug!(document = key, "No persisted document, starting empty");
                T::default()
            }
            Err(e) => {
                warn!(document = key, "Failed to load document, starting empty: {}", e);
                T::default()
            }
        }
    }

    fn save<T: Serialize>(&self, key: &str, doc: &T) -> PersistenceResult<()> {
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        self.store.write(key, &content)?;
        debug!(document = key, bytes = content.len(), "Document saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::{DocumentStore, MemoryStore};
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn persistence() -> (Persistence, Arc<MemoryStore>) {
        let store = MemoryStore::new().shared();
        (Persistence::new(store.clone()), store)
    }

    #[test]
    fn test_missing_documents_load_empty() {
        let (p, _) = persistence();
        assert!(p.load_feedback_queue().queue.is_empty());
        assert!(p.load_engine_performance().engine_weights.is_empty());
    }

    #[test]
    fn test_corrupt_document_loads_empty() {
        let (p, store) = persistence();
        store.write(FEEDBACK_QUEUE_KEY, "{ not json").unwrap();
        store
            .write(ENGINE_PERFORMANCE_KEY, r#"{"engine_weights": "wrong"}"#)
            .unwrap();

        assert!(p.load_feedback_queue().queue.is_empty());
        assert!(p.load_engine_performance().engine_performance.is_empty());

        let strict = p.try_load::<FeedbackQueueDocument>(FEEDBACK_QUEUE_KEY);
        assert!(matches!(strict, Err(PersistenceError::Malformed { .. })));
    }

    #[test]
    fn test_round_trip_is_exact() {
        let (p, _) = persistence();

        let mut context = Map::new();
        context.insert("source".to_string(), json!("dashboard"));
        let mut entry = crate::feedback::FeedbackEntry::new(
            json!("Senior"),
            json!("Lead"),
            context,
            vec!["x".to_string(), "y".to_string()],
        );
        entry.mark_distributed("x");
        let queue = FeedbackQueueDocument::new(vec![entry]);

        let mut perf = EnginePerformance::default();
        for (ok, c) in [(true, 0.91), (false, 0.37), (true, 0.6666)] {
            perf.record(ok, c);
        }
        let mut engines = BTreeMap::new();
        engines.insert("x".to_string(), perf);
        let mut weights = BTreeMap::new();
        weights.insert("x".to_string(), 2.0 / 3.0);
        let performance = EnginePerformanceDocument::new(engines, weights);

        p.save_feedback_queue(&queue).unwrap();
        p.save_engine_performance(&performance).unwrap();

        assert_eq!(p.load_feedback_queue(), queue);
        assert_eq!(p.load_engine_performance(), performance);
    }

    #[test]
    fn test_document_shape() {
        let (p, store) = persistence();
        p.save_engine_performance(&EnginePerformanceDocument::default())
            .unwrap();

        let raw = store.read(ENGINE_PERFORMANCE_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("engine_performance").is_some());
        assert!(value.get("engine_weights").is_some());
        assert!(value.get("last_saved").and_then(|v| v.as_str()).is_some());
    }
}
