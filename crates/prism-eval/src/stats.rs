//! Descriptive statistics over `f64` slices
//!
//! Percentiles use linear interpolation between closest ranks
//! (rank = p/100 * (n-1)), the same convention as NumPy's default.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Smallest value
pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Largest value
pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Median (50th percentile)
pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile `p` in [0, 100] with linear interpolation.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(percentile_sorted(&sorted, p))
}

/// Percentile over an already-sorted, non-empty slice.
pub(crate) fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Population standard deviation (ddof = 0)
pub fn std_population(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Sample standard deviation (ddof = 1). `None` for fewer than two values.
pub fn std_sample(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Pearson correlation coefficient.
///
/// `Ok(None)` when fewer than two pairs or either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<Option<f64>> {
    if x.len() != y.len() {
        return Err(EvalError::LengthMismatch {
            left: x.len(),
            right: y.len(),
        });
    }
    if x.len() < 2 {
        return Ok(None);
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }

    if den_x == 0.0 || den_y == 0.0 {
        Ok(None)
    } else {
        Ok(Some(num / (den_x.sqrt() * den_y.sqrt())))
    }
}

/// Group values by key; keys come back in sorted order.
pub fn group_by_key<K: Ord + Clone>(keys: &[K], values: &[f64]) -> Result<BTreeMap<K, Vec<f64>>> {
    if keys.len() != values.len() {
        return Err(EvalError::LengthMismatch {
            left: keys.len(),
            right: values.len(),
        });
    }
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (k, v) in keys.iter().zip(values) {
        groups.entry(k.clone()).or_default().push(*v);
    }
    Ok(groups)
}

/// Five-number-ish summary used for score statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub std: f64,
}

impl Summary {
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let (Some(mean), Some(median), Some(min), Some(max), Some(std)) = (
            mean(values),
            median(values),
            min(values),
            max(values),
            std_population(values),
        ) else {
            return Err(EvalError::empty("cannot summarize zero values"));
        };
        Ok(Self {
            mean,
            median,
            min,
            max,
            std,
        })
    }
}
