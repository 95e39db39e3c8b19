//! Coordinator configuration
//!
//! Options can come from defaults, `ENSEMBLE_*` environment variables, or a
//! TOML file. Every field has a serde default so partial files are accepted.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `ENSEMBLE_METHOD` | `weighted_vote` | Aggregation strategy |
//! | `ENSEMBLE_MIN_CONFIDENCE` | `0.5` | Advisory confidence threshold |
//! | `ENSEMBLE_FILTER_BELOW_THRESHOLD` | `false` | Drop votes under the threshold |
//! | `ENSEMBLE_AUTO_DISTRIBUTE` | `true` | Distribute feedback inside submit |
//! | `ENSEMBLE_RETRAIN_THRESHOLD` | `100` | Queue size that triggers retraining |
//! | `ENSEMBLE_CALIBRATION_WINDOW` | `1000` | Reserved for windowed calibration |
//! | `ENSEMBLE_SAVE_INTERVAL` | `10` | Persist every N submissions |
//! | `ENSEMBLE_MAX_QUEUE_SIZE` | `10000` | Soft cap on the feedback queue |
//! | `ENSEMBLE_ENGINE_TIMEOUT_MS` | `30000` | Per-engine prediction timeout |

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Strategy used to combine engine votes into one verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleMethod {
    /// Σ(weight × confidence) per prediction group
    #[default]
    WeightedVote,
    /// Single most confident vote
    HighestConfidence,
    /// Raw vote count per prediction
    MajorityVote,
}

impl EnsembleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedVote => "weighted_vote",
            Self::HighestConfidence => "highest_confidence",
            Self::MajorityVote => "majority_vote",
        }
    }

    pub fn all() -> &'static [EnsembleMethod] {
        &[
            Self::WeightedVote,
            Self::HighestConfidence,
            Self::MajorityVote,
        ]
    }
}

impl fmt::Display for EnsembleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnsembleMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_vote" | "weighted" => Ok(Self::WeightedVote),
            "highest_confidence" | "confidence" => Ok(Self::HighestConfidence),
            "majority_vote" | "majority" => Ok(Self::MajorityVote),
            other => Err(ConfigError::UnknownMethod(other.to_string())),
        }
    }
}

/// Errors raised while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown ensemble method: {0}")]
    UnknownMethod(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Configuration for the feedback-and-learning coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Default aggregation strategy for `ensemble_predict`
    #[serde(default)]
    pub ensemble_method: EnsembleMethod,

    /// Votes under this confidence are reported in the result. Advisory unless
    /// `filter_below_threshold` is set.
    #[serde(default = "default_min_confidence")]
    pub min_confidence_threshold: f64,

    /// Drop votes under `min_confidence_threshold` before aggregation
    #[serde(default)]
    pub filter_below_threshold: bool,

    /// Run distribution synchronously inside `submit_feedback`
    #[serde(default = "default_true")]
    pub auto_distribute_feedback: bool,

    /// Queue length that fires a retrain signal to every engine (0 disables)
    #[serde(default = "default_retrain_threshold")]
    pub retrain_threshold: usize,

    /// Reserved for windowed calibration; carried but not read
    #[serde(default = "default_calibration_window")]
    pub confidence_calibration_window: usize,

    /// Persist both documents every N submissions (0 disables)
    #[serde(default = "default_save_interval")]
    pub save_interval: usize,

    /// Soft cap on the feedback queue. Exceeding it logs a warning; nothing is
    /// evicted.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Per-engine timeout for a single prediction call
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_timeout_ms: u64,
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_retrain_threshold() -> usize {
    100
}

fn default_calibration_window() -> usize {
    1000
}

fn default_save_interval() -> usize {
    10
}

fn default_max_queue_size() -> usize {
    10_000
}

fn default_engine_timeout_ms() -> u64 {
    30_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ensemble_method: EnsembleMethod::default(),
            min_confidence_threshold: default_min_confidence(),
            filter_below_threshold: false,
            auto_distribute_feedback: true,
            retrain_threshold: default_retrain_threshold(),
            confidence_calibration_window: default_calibration_window(),
            save_interval: default_save_interval(),
            max_queue_size: default_max_queue_size(),
            engine_timeout_ms: default_engine_timeout_ms(),
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load a TOML file, then layer environment overrides on top
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("ENSEMBLE_METHOD") {
            match val.parse() {
                Ok(method) => self.ensemble_method = method,
                Err(e) => tracing::warn!("Ignoring ENSEMBLE_METHOD: {}", e),
            }
        }
        if let Some(v) = parse_env("ENSEMBLE_MIN_CONFIDENCE") {
            self.min_confidence_threshold = v;
        }
        if let Ok(val) = std::env::var("ENSEMBLE_FILTER_BELOW_THRESHOLD") {
            self.filter_below_threshold = parse_bool(&val);
        }
        if let Ok(val) = std::env::var("ENSEMBLE_AUTO_DISTRIBUTE") {
            self.auto_distribute_feedback = parse_bool(&val);
        }
        if let Some(v) = parse_env("ENSEMBLE_RETRAIN_THRESHOLD") {
            self.retrain_threshold = v;
        }
        if let Some(v) = parse_env("ENSEMBLE_CALIBRATION_WINDOW") {
            self.confidence_calibration_window = v;
        }
        if let Some(v) = parse_env("ENSEMBLE_SAVE_INTERVAL") {
            self.save_interval = v;
        }
        if let Some(v) = parse_env("ENSEMBLE_MAX_QUEUE_SIZE") {
            self.max_queue_size = v;
        }
        if let Some(v) = parse_env("ENSEMBLE_ENGINE_TIMEOUT_MS") {
            self.engine_timeout_ms = v;
        }
    }

    /// Per-engine prediction timeout
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    /// Check for settings that are legal but probably unintended
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !(0.0..=1.0).contains(&self.min_confidence_threshold) {
            issues.push(format!(
                "min_confidence_threshold {} is outside [0, 1]",
                self.min_confidence_threshold
            ));
        }
        if self.retrain_threshold == 0 {
            issues.push("retrain_threshold is 0: retraining is disabled".to_string());
        }
        if self.retrain_threshold > self.max_queue_size {
            issues.push(format!(
                "retrain_threshold {} exceeds max_queue_size {}",
                self.retrain_threshold, self.max_queue_size
            ));
        }
        if self.engine_timeout_ms == 0 {
            issues.push("engine_timeout_ms is 0: every engine call will time out".to_string());
        }

        issues
    }
}

fn parse_env<T: FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
}

/// Accepts "1", "true", or "yes" (case-insensitive)
fn parse_bool(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}
