//! Bulk retraining trigger
//!
//! Coarse-grained and at-least-once: when the feedback queue reaches the
//! threshold, every registered engine is asked to retrain and the whole queue
//! is cleared by the caller. There is no partial or incremental retraining.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::{EngineError, EngineHandle, EngineResult};

/// Which engines a retrain trigger reached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    /// Queue length that fired the trigger
    pub queue_len: usize,
    pub signalled: Vec<String>,
    /// Engines without the retraining capability
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Watches queue size and fans the retrain signal out to engines
#[derive(Debug, Clone)]
pub struct RetrainCoordinator {
    threshold: usize,
    triggers: u64,
}

impl RetrainCoordinator {
    /// A threshold of 0 disables retraining
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            triggers: 0,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of times the trigger has fired
    pub fn triggers(&self) -> u64 {
        self.triggers
    }

    pub fn should_trigger(&self, queue_len: usize) -> bool {
        self.threshold > 0 && queue_len >= self.threshold
    }

    /// Count a firing when `queue_len` has reached the threshold
    pub fn fire(&mut self, queue_len: usize) -> bool {
        if !self.should_trigger(queue_len) {
            return false;
        }
        self.triggers += 1;
        info!(
            queue_len,
            threshold = self.threshold,
            "Retrain threshold reached"
        );
        true
    }

    /// Ask every engine to retrain, each hook bounded by `timeout`.
    /// Failures are logged and do not stop the remaining engines.
    pub async fn signal(
        queue_len: usize,
        engines: &[(String, EngineHandle)],
        timeout: Duration,
    ) -> RetrainReport {
        let mut report = RetrainReport {
            queue_len,
            ..Default::default()
        };

        let mut hooked = Vec::with_capacity(engines.len());
        for (name, handle) in engines {
            if handle.retrain_hook().is_some() {
                hooked.push((name, handle));
            } else {
                debug!(engine = %name, "Engine has no retraining capability, skipping");
                report.skipped.push(name.clone());
            }
        }

        let outcomes =
            join_all(hooked.iter().map(|(_, handle)| request_retraining(handle, timeout))).await;

        for ((name, _), outcome) in hooked.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    debug!(engine = %name, "Retrain signalled");
                    report.signalled.push((*name).clone());
                }
                Err(e) => {
                    warn!(engine = %name, "Retrain failed: {}", e);
                    report.failed.push(((*name).clone(), e.to_string()));
                }
            }
        }

        report
    }
}

async fn request_retraining(handle: &EngineHandle, timeout: Duration) -> EngineResult<()> {
    let Some(hook) = handle.retrain_hook() else {
        return Err(EngineError::Unavailable("no retraining capability".to_string()));
    };
    tokio::time::timeout(timeout, hook.trigger_retraining())
        .await
        .map_err(|_| EngineError::Timeout(timeout))?
}
