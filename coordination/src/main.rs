//! Operator CLI for the ensemble feedback coordinator
//!
//! Read-only views over a coordinator's persisted state directory:
//! - `report`: per-engine weights, accuracy, and calibration
//! - `queue`: corrections waiting to be distributed
//! - `config`: the effective configuration as TOML
//!
//! # Usage
//!
//! ```bash
//! ensemble-feedback --state-dir ./ensemble-state report
//! ensemble-feedback report --json
//! ensemble-feedback queue --limit 20
//! ENSEMBLE_METHOD=majority_vote ensemble-feedback --config ensemble.toml config
//! ```

#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ensemble_feedback::state::{
    EnginePerformanceDocument, FeedbackQueueDocument, ENGINE_PERFORMANCE_KEY, FEEDBACK_QUEUE_KEY,
};
use ensemble_feedback::{CoordinatorConfig, JsonFileStore, Persistence};

/// Default state directory when neither flag nor environment names one
const DEFAULT_STATE_DIR: &str = ".ensemble-state";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the persisted documents (overrides ENSEMBLE_STATE_DIR)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// TOML configuration file; ENSEMBLE_* variables override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show per-engine performance and weights
    Report {
        /// Print the raw document as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List queued feedback
    Queue {
        /// Show at most this many entries, oldest first
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the effective configuration
    Config,
}

impl Args {
    fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .or_else(|| std::env::var("ENSEMBLE_STATE_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }

    fn coordinator_config(&self) -> Result<CoordinatorConfig> {
        match &self.config {
            Some(path) => CoordinatorConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display())),
            None => Ok(CoordinatorConfig::from_env()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ensemble_feedback=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let state_dir = args.state_dir();
    let persistence = Persistence::new(JsonFileStore::new(&state_dir).shared());
    tracing::debug!("State directory: {}", state_dir.display());

    match &args.command {
        Command::Report { json } => {
            let doc: EnginePerformanceDocument = persistence
                .try_load(ENGINE_PERFORMANCE_KEY)
                .context("Failed to read engine performance document")?
                .unwrap_or_default();

            if *json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_report(&doc);
            }
        }
        Command::Queue { limit } => {
            let doc: FeedbackQueueDocument = persistence
                .try_load(FEEDBACK_QUEUE_KEY)
                .context("Failed to read feedback queue document")?
                .unwrap_or_default();
            print_queue(&doc, *limit);
        }
        Command::Config => {
            let config = args.coordinator_config()?;
            for issue in config.validate() {
                tracing::warn!("{}", issue);
            }
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

fn print_report(doc: &EnginePerformanceDocument) {
    let mut names: Vec<&String> = doc
        .engine_performance
        .keys()
        .chain(doc.engine_weights.keys())
        .collect();
    names.sort();
    names.dedup();

    if names.is_empty() {
        println!("No engine performance recorded");
        return;
    }

    println!(
        "{:<24} {:>7} {:>8} {:>8} {:>9} {:>9} {:>11}",
        "ENGINE", "WEIGHT", "TOTAL", "CORRECT", "ACCURACY", "AVG_CONF", "CALIB_GAP"
    );
    for name in names {
        let weight = doc
            .engine_weights
            .get(name)
            .map(|w| format!("{:.3}", w))
            .unwrap_or_else(|| "-".to_string());
        let perf = doc.engine_performance.get(name).cloned().unwrap_or_default();
        println!(
            "{:<24} {:>7} {:>8} {:>8} {:>9.3} {:>9.3} {:>11.3}",
            name,
            weight,
            perf.total_predictions,
            perf.correct_predictions,
            perf.accuracy,
            perf.avg_confidence,
            perf.confidence_calibration
        );
    }
    println!("Last saved: {}", doc.last_saved.to_rfc3339());
}

fn print_queue(doc: &FeedbackQueueDocument, limit: Option<usize>) {
    println!("{} queued correction(s)", doc.queue.len());

    let shown = limit.unwrap_or(doc.queue.len());
    for entry in doc.queue.iter().take(shown) {
        println!(
            "{}  {}  {} -> {}  [{}]",
            entry.id,
            entry.timestamp.to_rfc3339(),
            entry.original_prediction,
            entry.user_correction,
            entry.engines_involved.join(", ")
        );
    }
    if shown < doc.queue.len() {
        println!("... {} more", doc.queue.len() - shown);
    }
}
