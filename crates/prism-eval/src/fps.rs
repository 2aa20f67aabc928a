//! Frame-rate summary over already-recorded samples

use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::inputs::read_fps_samples;
use crate::outputs::OutputContract;
use crate::signing::write_signed_json;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Contents of fps.json
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FpsStats {
    #[serde(rename = "meanFPS")]
    pub mean_fps: f64,
    #[serde(rename = "minFPS")]
    pub min_fps: f64,
    #[serde(rename = "maxFPS")]
    pub max_fps: f64,
    /// Nearest-rank percentile (95th unless configured otherwise)
    #[serde(rename = "p95FPS")]
    pub p95_fps: f64,
    pub iterations: usize,
}

/// Nearest-rank percentile: `sorted[floor(n * p / 100)]`, clamped to the last index
pub fn nearest_rank(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() as f64 * p / 100.0).floor() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}

impl FpsStats {
    pub fn from_samples(samples: &[f64], percentile: f64) -> crate::Result<Self> {
        if samples.is_empty() {
            return Err(EvalError::empty("no frame-rate samples"));
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Ok(Self {
            mean_fps: sorted.iter().sum::<f64>() / sorted.len() as f64,
            min_fps: sorted[0],
            max_fps: sorted[sorted.len() - 1],
            p95_fps: nearest_rank(&sorted, percentile).unwrap_or(sorted[0]),
            iterations: sorted.len(),
        })
    }

    pub fn print_summary(&self) {
        println!("Mean FPS: {:.2}", self.mean_fps);
        println!("Min FPS: {}", self.min_fps);
        println!("Max FPS: {}", self.max_fps);
        println!("95th percentile: {}", self.p95_fps);
    }
}

#[derive(Debug, Clone)]
pub struct FpsResult {
    pub stats: FpsStats,
    pub signature: Option<String>,
    pub path: PathBuf,
}

/// Summarizes a samples file into fps.json
pub struct FpsStage {
    config: EvalConfig,
    output: OutputContract,
    samples_path: PathBuf,
}

impl FpsStage {
    pub fn new(config: EvalConfig, samples_path: PathBuf, output_dir: PathBuf) -> Result<Self> {
        if !samples_path.exists() {
            bail!("Samples file not found: {}", samples_path.display());
        }
        let output = OutputContract::new(&output_dir)?;
        Ok(Self {
            config,
            output,
            samples_path,
        })
    }

    pub fn run(&self) -> Result<FpsResult> {
        log::info!("Loading frame-rate samples from {}", self.samples_path.display());
        let samples = read_fps_samples(&self.samples_path)
            .with_context(|| format!("Failed to load {}", self.samples_path.display()))?;
        log::info!("  Loaded {} samples", samples.len());

        let stats = FpsStats::from_samples(&samples, self.config.fps.percentile)?;
        let path = self.output.fps_json();
        let signature = write_signed_json(&path, &stats, self.config.output.sign)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        if self.config.output.provenance {
            self.output.write_provenance("fps", std::slice::from_ref(&path))?;
        }

        Ok(FpsResult {
            stats,
            signature,
            path,
        })
    }
}
