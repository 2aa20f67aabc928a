//! prism-eval: evaluation scoring and signed result reports
//!
//! Turns recorded predictions, timings and frame-rate samples into
//! descriptive metric summaries, SVG figures and JSON result files carrying
//! a SHA-256 signature.
//!
//! # Stages
//!
//! - TruthfulQA accuracy, overall and per category
//! - EmoBench confusion matrix, classification report, safety/empathy scores
//! - Latency percentiles, component breakdown, cache and prompt-length impact
//! - Fixed truthfulness/safety suites scored against recorded responses
//! - Frame-rate summary over recorded samples
//! - HTML status page over a results directory
//!
//! # CLI Contract
//!
//! ```bash
//! prism-eval truthfulqa --predictions preds.jsonl [--ground-truth gt.jsonl] --output-dir out/
//! prism-eval latency --timings timings.csv --output-dir out/
//! prism-eval verify out/metrics.json out/latency_metrics.json
//! prism-eval status --results-dir out/
//! ```

pub mod classification;
pub mod config;
pub mod emobench;
pub mod error;
pub mod figures;
pub mod fps;
pub mod inputs;
pub mod latency;
pub mod outputs;
pub mod reports;
pub mod signing;
pub mod stats;
pub mod suites;
pub mod truthfulqa;

// Re-exports
pub use classification::{ClassificationReport, ConfusionMatrix};
pub use config::EvalConfig;
pub use emobench::{EmoBenchResult, EmoBenchStage};
pub use error::{EvalError, Result};
pub use fps::{FpsResult, FpsStage, FpsStats};
pub use latency::{ComponentBreakdown, LatencyMetrics, LatencyResult, LatencyStage};
pub use outputs::{OutputContract, ProvenanceManifest};
pub use reports::StatusPage;
pub use signing::{verify_signed_json, write_signed_json, SignatureStatus};
pub use suites::{SuiteKind, SuiteResult, SuiteStage};
pub use truthfulqa::{TruthfulQaMetrics, TruthfulQaResult, TruthfulQaStage};

/// Crate version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
