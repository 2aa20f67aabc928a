//! prism-eval CLI entry point
//!
//! ```
//! prism-eval truthfulqa --predictions preds.jsonl --ground-truth gt.jsonl -o results/
//! prism-eval emobench --predictions emo.jsonl -o results/
//! prism-eval latency --timings timings.csv -o results/
//! prism-eval suite truthfulqa --responses responses.jsonl -o results/
//! prism-eval verify results/metrics.json
//! prism-eval status --results-dir results/
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use prism_eval::{
    signing::verify_signed_json, EmoBenchStage, EvalConfig, FpsStage, LatencyStage, SignatureStatus,
    StatusPage, SuiteKind, SuiteStage, TruthfulQaStage,
};

/// Evaluation scoring, latency analysis and signed result reports
#[derive(Parser, Debug)]
#[command(name = "prism-eval")]
#[command(author = "PRISM4D Team")]
#[command(version)]
#[command(about = "Score recorded evaluation runs and write signed result files", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score TruthfulQA predictions
    Truthfulqa(TruthfulQaArgs),

    /// Analyze EmoBench predictions
    Emobench(EmoBenchArgs),

    /// Analyze latency timings
    Latency(LatencyArgs),

    /// Summarize recorded frame-rate samples
    Fps(FpsArgs),

    /// Score recorded responses against a fixed suite
    Suite(SuiteArgs),

    /// Check result files against their .sig files
    Verify(VerifyArgs),

    /// Write an HTML status page for a results directory
    Status(StatusArgs),

    /// Show version and build info
    Version,
}

/// Flags shared by every analysis subcommand
#[derive(Args, Debug)]
struct OutputArgs {
    /// Output directory
    #[arg(long, short = 'o', default_value = "./")]
    output_dir: PathBuf,

    /// Skip SVG figures
    #[arg(long)]
    no_figures: bool,

    /// Skip .sig files
    #[arg(long)]
    no_sign: bool,
}

#[derive(Args, Debug)]
struct TruthfulQaArgs {
    /// Predictions JSONL (question_id, score, optional category)
    #[arg(long, required = true)]
    predictions: PathBuf,

    /// Ground truth JSONL joined on question_id
    #[arg(long)]
    ground_truth: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct EmoBenchArgs {
    /// Predictions JSONL (prompt_id, emotion_category, safety_score, empathy_score)
    #[arg(long, required = true)]
    predictions: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct LatencyArgs {
    /// Timings CSV with one column per component
    #[arg(long, required = true)]
    timings: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct FpsArgs {
    /// Frame-rate samples (JSON array or one number per line)
    #[arg(long, required = true)]
    samples: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SuiteName {
    Truthfulqa,
    Emobench,
}

impl From<SuiteName> for SuiteKind {
    fn from(name: SuiteName) -> Self {
        match name {
            SuiteName::Truthfulqa => SuiteKind::TruthfulQa,
            SuiteName::Emobench => SuiteKind::EmoBench,
        }
    }
}

#[derive(Args, Debug)]
struct SuiteArgs {
    /// Which suite to score
    #[arg(value_enum)]
    suite: SuiteName,

    /// Recorded responses JSONL
    #[arg(long, required = true)]
    responses: PathBuf,

    /// Replace the built-in dataset with a JSONL file
    #[arg(long)]
    dataset: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// JSON result files
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Directory holding result files
    #[arg(long, required = true)]
    results_dir: PathBuf,

    /// Output HTML path (defaults to <results-dir>/status.html)
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Truthfulqa(args) => {
            let config = load_config(cli.config.as_deref(), &args.output)?;
            let result = TruthfulQaStage::new(
                config,
                args.predictions,
                args.ground_truth,
                args.output.output_dir.clone(),
            )?
            .run()?;
            result.metrics.print_summary();
            print_files(&args.output.output_dir, result.files_generated.len(), result.signature.as_deref());
            Ok(())
        }
        Commands::Emobench(args) => {
            let config = load_config(cli.config.as_deref(), &args.output)?;
            let result =
                EmoBenchStage::new(config, args.predictions, args.output.output_dir.clone())?.run()?;
            result.analysis.metrics.print_summary();
            print_files(&args.output.output_dir, result.files_generated.len(), None);
            Ok(())
        }
        Commands::Latency(args) => {
            let config = load_config(cli.config.as_deref(), &args.output)?;
            let result =
                LatencyStage::new(config, args.timings, args.output.output_dir.clone())?.run()?;
            result.metrics.print_summary();
            print_files(&args.output.output_dir, result.files_generated.len(), result.signature.as_deref());
            Ok(())
        }
        Commands::Fps(args) => {
            let config = load_config(cli.config.as_deref(), &args.output)?;
            let result = FpsStage::new(config, args.samples, args.output.output_dir.clone())?.run()?;
            result.stats.print_summary();
            print_files(&args.output.output_dir, 1, result.signature.as_deref());
            Ok(())
        }
        Commands::Suite(args) => {
            let config = load_config(cli.config.as_deref(), &args.output)?;
            let result = SuiteStage::new(
                config,
                args.suite.into(),
                args.responses,
                args.dataset,
                args.output.output_dir,
            )?
            .run()?;
            result.print_summary();
            Ok(())
        }
        Commands::Verify(args) => run_verify(&args.files),
        Commands::Status(args) => run_status(args),
        Commands::Version => show_version(),
    }
}

/// Config file (or defaults) with the command-line overrides applied
fn load_config(path: Option<&Path>, output: &OutputArgs) -> Result<EvalConfig> {
    let mut config = match path {
        Some(p) => {
            if !p.exists() {
                bail!("Config file not found: {}", p.display());
            }
            log::info!("Loading config from {}", p.display());
            EvalConfig::from_file(p).with_context(|| format!("Invalid config {}", p.display()))?
        }
        None => EvalConfig::default(),
    };

    if output.no_figures {
        config.output.figures = false;
    }
    if output.no_sign {
        config.output.sign = false;
    }
    Ok(config)
}

fn print_files(output_dir: &Path, count: usize, signature: Option<&str>) {
    println!();
    println!("Results: {} ({} files)", output_dir.display(), count);
    if let Some(sig) = signature {
        println!("Signature: {}", sig);
    }
}

fn run_verify(files: &[PathBuf]) -> Result<()> {
    let mut mismatches = 0;
    for path in files {
        if !path.exists() {
            bail!("File not found: {}", path.display());
        }
        let status = verify_signed_json(path)
            .with_context(|| format!("Failed to verify {}", path.display()))?;
        match &status {
            SignatureStatus::Verified { digest } => {
                println!("{}: verified ({})", path.display(), digest);
            }
            SignatureStatus::Mismatch { expected, actual } => {
                mismatches += 1;
                println!(
                    "{}: MISMATCH (expected {}, computed {})",
                    path.display(),
                    expected,
                    actual
                );
            }
            SignatureStatus::Unsigned => println!("{}: unsigned", path.display()),
        }
    }

    if mismatches > 0 {
        bail!("{} of {} files failed signature verification", mismatches, files.len());
    }
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<()> {
    if !args.results_dir.is_dir() {
        bail!("Results directory not found: {}", args.results_dir.display());
    }
    let out = args.out.unwrap_or_else(|| args.results_dir.join("status.html"));

    let page = StatusPage::scan(&args.results_dir)?;
    page.write(&out)?;

    println!("Verified: {}", page.count("verified"));
    println!("Mismatch: {}", page.count("mismatch"));
    println!("Unsigned: {}", page.count("unsigned"));
    println!("Status page: {}", out.display());
    Ok(())
}

fn show_version() -> Result<()> {
    println!("prism-eval {}", prism_eval::VERSION);
    println!();
    println!("Build info:");
    println!("  Platform: {}-{}", std::env::consts::OS, std::env::consts::ARCH);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_eval::write_signed_json;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn output_args(no_figures: bool, no_sign: bool) -> OutputArgs {
        OutputArgs {
            output_dir: PathBuf::from("./"),
            no_figures,
            no_sign,
        }
    }

    #[test]
    fn test_verify_fails_on_mismatch() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("metrics.json");
        let edited = tmp.path().join("fps.json");
        write_signed_json(&good, &json!({"accuracy": 0.75}), true).unwrap();
        write_signed_json(&edited, &json!({"meanFPS": 59.5}), true).unwrap();
        fs::write(&edited, r#"{"meanFPS": 60.0}"#).unwrap();

        let err = run_verify(&[good, edited]).unwrap_err();
        assert!(err.to_string().contains("1 of 2"), "{err}");
    }

    #[test]
    fn test_verify_accepts_unsigned_and_verified() {
        let tmp = TempDir::new().unwrap();
        let signed = tmp.path().join("metrics.json");
        let unsigned = tmp.path().join("latency_metrics.json");
        write_signed_json(&signed, &json!({"accuracy": 0.75}), true).unwrap();
        write_signed_json(&unsigned, &json!({"p50": 190.0}), false).unwrap();

        assert!(run_verify(&[signed, unsigned]).is_ok());
    }

    #[test]
    fn test_verify_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(run_verify(&[tmp.path().join("missing.json")]).is_err());
    }

    #[test]
    fn test_no_sign_overrides_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("eval.toml");
        fs::write(&path, "[output]\nsign = true\nfigures = true\n").unwrap();

        let config = load_config(Some(path.as_path()), &output_args(false, true)).unwrap();
        assert!(!config.output.sign);
        assert!(config.output.figures);

        let config = load_config(Some(path.as_path()), &output_args(true, false)).unwrap();
        assert!(config.output.sign);
        assert!(!config.output.figures);
    }

    #[test]
    fn test_defaults_without_config_file() {
        let config = load_config(None, &output_args(false, false)).unwrap();
        assert!(config.output.sign);
        assert!(config.output.provenance);
    }

    #[test]
    fn test_missing_config_file_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.toml");
        let err = load_config(Some(path.as_path()), &output_args(false, false)).unwrap_err();
        assert!(err.to_string().contains("Config file not found"), "{err}");
    }
}
