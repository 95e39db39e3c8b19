//! Engine Registry: named engine handles and their voting weights
//!
//! Engines keep the position they were first registered at; that order is the
//! final tie-breaker for highest-confidence voting. Weights are clamped to
//! `[0, 1]` on every write.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{EngineCapabilities, EngineHandle};

/// Weight given to engines registered without an explicit or restored weight
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Clamp a weight into `[0, 1]`. NaN becomes 0.
pub fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(0.0, 1.0)
    }
}

/// Outcome of a registration call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    /// First registration of this name
    Registered,
    /// The name existed; its handle was replaced
    AlreadyRegistered,
}

/// A registered engine entry
#[derive(Debug, Clone)]
pub struct RegisteredEngine {
    pub name: String,
    pub weight: f64,
    pub handle: EngineHandle,
}

/// Weight and registration position of one engine at snapshot time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStanding {
    pub weight: f64,
    pub order: usize,
}

/// Point-in-time view of weights and registration order used for aggregation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightSnapshot {
    standings: HashMap<String, EngineStanding>,
}

impl WeightSnapshot {
    /// Build from `(name, weight)` pairs; order follows iteration order
    pub fn from_weights<I, S>(weights: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let standings = weights
            .into_iter()
            .enumerate()
            .map(|(order, (name, weight))| {
                (
                    name.into(),
                    EngineStanding {
                        weight: clamp_weight(weight),
                        order,
                    },
                )
            })
            .collect();
        Self { standings }
    }

    /// Weight for an engine; unknown engines count at [`DEFAULT_WEIGHT`]
    pub fn weight(&self, engine: &str) -> f64 {
        self.standings
            .get(engine)
            .map(|s| s.weight)
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Registration position; unknown engines sort last
    pub fn order(&self, engine: &str) -> usize {
        self.standings
            .get(engine)
            .map(|s| s.order)
            .unwrap_or(usize::MAX)
    }

    pub fn get(&self, engine: &str) -> Option<EngineStanding> {
        self.standings.get(engine).copied()
    }

    pub fn len(&self) -> usize {
        self.standings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }
}

/// Summary row for admin listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSummary {
    pub name: String,
    pub weight: f64,
    pub capabilities: EngineCapabilities,
}

/// Registry of engine handles keyed by name
#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: Vec<RegisteredEngine>,
    index: HashMap<String, usize>,
    /// Weights loaded from persistence for engines not yet registered
    restored: BTreeMap<String, f64>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed weights from a persisted document.
    ///
    /// Registered engines take the weight immediately; others keep it until an
    /// engine with that name registers without an explicit weight.
    pub fn restore_weights(&mut self, weights: &BTreeMap<String, f64>) {
        for (name, weight) in weights {
            let weight = clamp_weight(*weight);
            match self.index.get(name) {
                Some(&idx) => self.engines[idx].weight = weight,
                None => {
                    self.restored.insert(name.clone(), weight);
                }
            }
        }
    }

    /// Register an engine or replace the handle of an existing one.
    ///
    /// `initial_weight` of `None` uses a restored weight when one exists, the
    /// current weight for a re-registration, and [`DEFAULT_WEIGHT`] otherwise.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handle: EngineHandle,
        initial_weight: Option<f64>,
    ) -> Registration {
        let name = name.into();

        if let Some(&idx) = self.index.get(&name) {
            let entry = &mut self.engines[idx];
            entry.handle = handle;
            if let Some(weight) = initial_weight {
                entry.weight = clamp_weight(weight);
            }
            info!(engine = %name, weight = entry.weight, "Engine re-registered, handle replaced");
            return Registration::AlreadyRegistered;
        }

        let weight = match initial_weight {
            Some(w) => clamp_weight(w),
            None => self.restored.get(&name).copied().unwrap_or(DEFAULT_WEIGHT),
        };
        self.restored.remove(&name);

        self.index.insert(name.clone(), self.engines.len());
        self.engines.push(RegisteredEngine {
            name: name.clone(),
            weight,
            handle,
        });
        info!(engine = %name, weight, "Engine registered");
        Registration::Registered
    }

    /// Set a weight, returning the previous value. `None` if not registered.
    pub fn set_weight(&mut self, name: &str, weight: f64) -> Option<f64> {
        let idx = *self.index.get(name)?;
        let entry = &mut self.engines[idx];
        let previous = entry.weight;
        entry.weight = clamp_weight(weight);
        debug!(engine = %name, previous, weight = entry.weight, "Engine weight set");
        Some(previous)
    }

    pub fn weight(&self, name: &str) -> Option<f64> {
        self.index.get(name).map(|&idx| self.engines[idx].weight)
    }

    /// Current weights of registered engines
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.engines
            .iter()
            .map(|e| (e.name.clone(), e.weight))
            .collect()
    }

    /// Registered weights plus restored weights awaiting registration
    pub fn persisted_weights(&self) -> BTreeMap<String, f64> {
        let mut weights = self.restored.clone();
        weights.extend(self.weights());
        weights
    }

    /// Handles in registration order, optionally limited to `names`.
    ///
    /// Unknown names in the filter are skipped.
    pub fn handles(&self, names: Option<&[String]>) -> Vec<(String, EngineHandle)> {
        self.engines
            .iter()
            .filter(|e| names.map_or(true, |wanted| wanted.iter().any(|n| n == &e.name)))
            .map(|e| (e.name.clone(), e.handle.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredEngine> {
        self.index.get(name).map(|&idx| &self.engines[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name.clone()).collect()
    }

    pub fn snapshot(&self) -> WeightSnapshot {
        WeightSnapshot::from_weights(self.engines.iter().map(|e| (e.name.clone(), e.weight)))
    }

    pub fn summaries(&self) -> Vec<EngineSummary> {
        self.engines
            .iter()
            .map(|e| EngineSummary {
                name: e.name.clone(),
                weight: e.weight,
                capabilities: e.handle.capabilities(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
