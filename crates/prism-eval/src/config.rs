//! Configuration structures for the evaluation stages
//!
//! Loaded from an optional TOML file. Every section has defaults, so an empty
//! file (or no file) is a valid configuration.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default)]
    pub output: OutputFormats,

    #[serde(default)]
    pub figures: FigureConfig,

    #[serde(default)]
    pub latency: LatencyConfig,

    #[serde(default)]
    pub fps: FpsConfig,
}

impl EvalConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<()> {
        if self.figures.histogram_bins == 0 {
            return Err(EvalError::config("figures.histogram_bins must be > 0"));
        }
        if self.figures.width == 0 || self.figures.height == 0 {
            return Err(EvalError::config("figure dimensions must be non-zero"));
        }
        self.latency.validate()?;
        if !(0.0..=100.0).contains(&self.fps.percentile) {
            return Err(EvalError::config(format!(
                "fps.percentile must be within [0, 100], got {}",
                self.fps.percentile
            )));
        }
        Ok(())
    }
}

/// Which artifacts to produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFormats {
    /// Render SVG figures
    #[serde(default = "default_true")]
    pub figures: bool,
    /// Write `.sig` files next to JSON results
    #[serde(default = "default_true")]
    pub sign: bool,
    /// Write provenance.json listing every artifact with its digest
    #[serde(default = "default_true")]
    pub provenance: bool,
}

impl Default for OutputFormats {
    fn default() -> Self {
        Self {
            figures: true,
            sign: true,
            provenance: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Figure rendering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Bins for score and latency histograms
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    500
}

fn default_histogram_bins() -> usize {
    20
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            histogram_bins: default_histogram_bins(),
        }
    }
}

/// A timed component column and its display label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub column: String,
    pub label: String,
}

impl ComponentSpec {
    fn new(column: &str, label: &str) -> Self {
        Self {
            column: column.to_string(),
            label: label.to_string(),
        }
    }
}

/// Latency table layout and reported percentiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    /// Percentiles reported for the total column
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,
    #[serde(default = "default_total_column")]
    pub total_column: String,
    #[serde(default = "default_cache_column")]
    pub cache_column: String,
    #[serde(default = "default_prompt_length_column")]
    pub prompt_length_column: String,
    #[serde(default = "default_components")]
    pub components: Vec<ComponentSpec>,
}

fn default_percentiles() -> Vec<f64> {
    vec![50.0, 90.0, 95.0, 99.0]
}

fn default_total_column() -> String {
    "total_time_ms".to_string()
}

fn default_cache_column() -> String {
    "cache_hit".to_string()
}

fn default_prompt_length_column() -> String {
    "prompt_length".to_string()
}

fn default_components() -> Vec<ComponentSpec> {
    vec![
        ComponentSpec::new("parsing_time_ms", "Parsing"),
        ComponentSpec::new("reasoning_time_ms", "Reasoning"),
        ComponentSpec::new("generation_time_ms", "Generation"),
        ComponentSpec::new("post_processing_time_ms", "Post-processing"),
    ]
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            percentiles: default_percentiles(),
            total_column: default_total_column(),
            cache_column: default_cache_column(),
            prompt_length_column: default_prompt_length_column(),
            components: default_components(),
        }
    }
}

impl LatencyConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(EvalError::config(format!(
                "latency percentile {} outside [0, 100]",
                p
            )));
        }
        if self.components.is_empty() {
            return Err(EvalError::config("latency.components must not be empty"));
        }
        if self.components.iter().any(|c| c.column == self.total_column) {
            return Err(EvalError::config(format!(
                "component column '{}' collides with the total column",
                self.total_column
            )));
        }
        Ok(())
    }

    /// JSON key for a percentile, e.g. 99.0 -> "p99", 99.9 -> "p99.9"
    pub fn percentile_key(p: f64) -> String {
        if p.fract() == 0.0 {
            format!("p{}", p as u32)
        } else {
            format!("p{}", p)
        }
    }
}

/// Frame-rate summary options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpsConfig {
    /// Nearest-rank percentile reported as `p95FPS`
    #[serde(default = "default_fps_percentile")]
    pub percentile: f64,
}

fn default_fps_percentile() -> f64 {
    95.0
}

impl Default for FpsConfig {
    fn default() -> Self {
        Self {
            percentile: default_fps_percentile(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EvalConfig::from_toml("").unwrap();
        assert!(config.output.figures);
        assert!(config.output.sign);
        assert_eq!(config.figures.histogram_bins, 20);
        assert_eq!(config.latency.percentiles, vec![50.0, 90.0, 95.0, 99.0]);
        assert_eq!(config.latency.components.len(), 4);
    }

    #[test]
    fn test_partial_override() {
        let config = EvalConfig::from_toml(
            r#"
            [output]
            sign = false

            [latency]
            percentiles = [50, 99.9]
            "#,
        )
        .unwrap();
        assert!(!config.output.sign);
        assert!(config.output.figures);
        assert_eq!(config.latency.percentiles, vec![50.0, 99.9]);
        assert_eq!(config.latency.total_column, "total_time_ms");
    }

    #[test]
    fn test_rejects_bad_percentile() {
        let err = EvalConfig::from_toml("[latency]\npercentiles = [101]\n").unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn test_rejects_component_total_collision() {
        let err = EvalConfig::from_toml(
            r#"
            [latency]
            components = [{ column = "total_time_ms", label = "Total" }]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn test_percentile_key() {
        assert_eq!(LatencyConfig::percentile_key(50.0), "p50");
        assert_eq!(LatencyConfig::percentile_key(99.9), "p99.9");
    }
}
