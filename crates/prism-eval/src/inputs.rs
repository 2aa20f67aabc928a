//! Input record types and loaders (JSON Lines, CSV, sample lists)

use crate::config::LatencyConfig;
use crate::error::{EvalError, Result};
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read one JSON object per line. Blank lines and `#` comments are skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: T = serde_json::from_str(trimmed)
            .map_err(|e| EvalError::invalid_record(path, line_num + 1, e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}

/// Record identifier as written in the input: a JSON string or integer.
///
/// Joins use [`RecordId::key`], so `1` and `"1"` name the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{}", i),
            RecordId::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Str(s.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(i: i64) -> Self {
        RecordId::Int(i)
    }
}

/// A scored TruthfulQA prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub question_id: RecordId,
    /// 1.0 for a truthful answer, 0.0 otherwise (fractional scores allowed)
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<serde_json::Value>,
}

/// A ground-truth row keyed by `question_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub question_id: RecordId,
    pub ground_truth: serde_json::Value,
    #[serde(default)]
    pub category: Option<String>,
}

/// Load ground truth keyed by [`RecordId::key`]. Later rows replace earlier ones.
pub fn read_ground_truth(path: &Path) -> Result<HashMap<String, GroundTruth>> {
    let rows: Vec<GroundTruth> = read_jsonl(path)?;
    Ok(rows
        .into_iter()
        .map(|gt| (gt.question_id.key(), gt))
        .collect())
}

/// An EmoBench prediction with safety and empathy scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionPrediction {
    pub prompt_id: RecordId,
    /// True emotion label
    pub emotion_category: String,
    pub safety_score: f64,
    pub empathy_score: f64,
    /// Model's emotion label; absent means the true label is assumed
    #[serde(default)]
    pub predicted_emotion: Option<String>,
}

impl EmotionPrediction {
    pub fn predicted_label(&self) -> &str {
        self.predicted_emotion
            .as_deref()
            .unwrap_or(&self.emotion_category)
    }
}

/// Named component durations of a timing table
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentColumn {
    pub column: String,
    pub label: String,
    pub values: Vec<f64>,
}

/// Column-oriented timing measurements
#[derive(Debug, Clone, PartialEq)]
pub struct TimingTable {
    pub total_ms: Vec<f64>,
    pub cache_hit: Vec<bool>,
    pub prompt_length: Vec<i64>,
    pub components: Vec<ComponentColumn>,
}

impl TimingTable {
    /// Load from a CSV file with a header row
    pub fn load(path: &Path, config: &LatencyConfig) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let headers = reader.headers()?.clone();

        let column_index = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| EvalError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };

        let total_idx = column_index(&config.total_column)?;
        let cache_idx = column_index(&config.cache_column)?;
        let length_idx = column_index(&config.prompt_length_column)?;
        let component_idx = config
            .components
            .iter()
            .map(|c| column_index(&c.column))
            .collect::<Result<Vec<_>>>()?;

        let mut table = TimingTable {
            total_ms: Vec::new(),
            cache_hit: Vec::new(),
            prompt_length: Vec::new(),
            components: config
                .components
                .iter()
                .map(|c| ComponentColumn {
                    column: c.column.clone(),
                    label: c.label.clone(),
                    values: Vec::new(),
                })
                .collect(),
        };

        for (row_num, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let line = row_num + 2;
            let cell = |idx: usize| record.get(idx).unwrap_or("");

            table
                .total_ms
                .push(parse_f64(cell(total_idx), path, line, &config.total_column)?);
            table
                .cache_hit
                .push(parse_bool(cell(cache_idx)).ok_or_else(|| {
                    EvalError::invalid_record(
                        path,
                        line,
                        format!("'{}' is not a boolean in column '{}'", cell(cache_idx), config.cache_column),
                    )
                })?);
            table
                .prompt_length
                .push(parse_length(cell(length_idx), path, line, &config.prompt_length_column)?);
            for (component, &idx) in table.components.iter_mut().zip(&component_idx) {
                let value = parse_f64(cell(idx), path, line, &component.column)?;
                component.values.push(value);
            }
        }

        log::debug!("Loaded {} timing rows from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.total_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_ms.is_empty()
    }

    /// Total latencies where the cache flag equals `hit`
    pub fn totals_where_cache(&self, hit: bool) -> Vec<f64> {
        self.total_ms
            .iter()
            .zip(&self.cache_hit)
            .filter(|(_, h)| **h == hit)
            .map(|(t, _)| *t)
            .collect()
    }
}

fn parse_f64(raw: &str, path: &Path, line: usize, column: &str) -> Result<f64> {
    raw.parse::<f64>().map_err(|_| {
        EvalError::invalid_record(
            path,
            line,
            format!("'{}' is not numeric in column '{}'", raw, column),
        )
    })
}

fn parse_length(raw: &str, path: &Path, line: usize, column: &str) -> Result<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    // Accept "120.0" style integers written by spreadsheet exports
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 => Ok(v as i64),
        _ => Err(EvalError::invalid_record(
            path,
            line,
            format!("'{}' is not an integer in column '{}'", raw, column),
        )),
    }
}

/// Parse the boolean spellings found in exported tables
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Read frame-rate samples: a JSON array of numbers, or one number per line.
pub fn read_fps_samples(path: &Path) -> Result<Vec<f64>> {
    let content = std::fs::read_to_string(path)?;
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut samples = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value = line.parse::<f64>().map_err(|_| {
            EvalError::invalid_record(path, line_num + 1, format!("'{}' is not a number", line))
        })?;
        samples.push(value);
    }
    Ok(samples)
}
