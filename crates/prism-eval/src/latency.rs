//! Latency analysis: percentiles, component breakdown, cache impact and
//! prompt-length correlation over a recorded timing table.

use crate::config::{EvalConfig, LatencyConfig};
use crate::error::EvalError;
use crate::figures::{self, Bar, Marker, Series};
use crate::inputs::TimingTable;
use crate::outputs::OutputContract;
use crate::signing::write_signed_json;
use crate::stats;
use anyhow::{bail, Context, Result};
use plotters::style::{BLUE, GREEN, RED};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;
use std::path::PathBuf;

/// Distribution of the total latency column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    /// Configured percentiles keyed `p50`, `p99.9`, ...
    #[serde(flatten)]
    pub percentiles: BTreeMap<String, f64>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; `None` for a single row
    pub std: Option<f64>,
}

impl LatencyPercentiles {
    pub fn get(&self, p: f64) -> Option<f64> {
        self.percentiles.get(&LatencyConfig::percentile_key(p)).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStats {
    pub label: String,
    pub mean: f64,
    /// Share of the summed total latency, in percent
    pub percentage: f64,
}

/// Per-component stats keyed by CSV column, in configured component order.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentBreakdown(Vec<(String, ComponentStats)>);

impl ComponentBreakdown {
    pub fn get(&self, column: &str) -> Option<&ComponentStats> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComponentStats)> {
        self.0.iter().map(|(c, s)| (c.as_str(), s))
    }

    pub fn columns(&self) -> Vec<&str> {
        self.0.iter().map(|(c, _)| c.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ComponentStats)> for ComponentBreakdown {
    fn from_iter<I: IntoIterator<Item = (String, ComponentStats)>>(iter: I) -> Self {
        let mut breakdown = Self::default();
        for (column, stats) in iter {
            // Later duplicates replace earlier ones in place
            match breakdown.0.iter_mut().find(|(c, _)| *c == column) {
                Some(slot) => slot.1 = stats,
                None => breakdown.0.push((column, stats)),
            }
        }
        breakdown
    }
}

impl Index<&str> for ComponentBreakdown {
    type Output = ComponentStats;

    fn index(&self, column: &str) -> &ComponentStats {
        match self.get(column) {
            Some(s) => s,
            None => panic!("no component column {:?}", column),
        }
    }
}

impl Serialize for ComponentBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, stats) in &self.0 {
            map.serialize_entry(column, stats)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ComponentBreakdown {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct BreakdownVisitor;

        impl<'de> Visitor<'de> for BreakdownVisitor {
            type Value = ComponentBreakdown;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of component column to stats")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> std::result::Result<Self::Value, M::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, ComponentStats>()? {
                    entries.push(entry);
                }
                Ok(entries.into_iter().collect())
            }
        }

        deserializer.deserialize_map(BreakdownVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheGroupStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
}

impl CacheGroupStats {
    fn from_values(values: &[f64]) -> Self {
        Self {
            count: values.len(),
            mean: stats::mean(values),
            p50: stats::percentile(values, 50.0),
            p95: stats::percentile(values, 95.0),
        }
    }
}

/// Miss minus hit; percentages are relative to the miss value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheImprovement {
    pub mean_reduction: f64,
    pub mean_reduction_percent: Option<f64>,
    pub p50_reduction: f64,
    pub p50_reduction_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub cache_hit: CacheGroupStats,
    pub cache_miss: CacheGroupStats,
    /// `None` unless both groups have rows
    pub improvement: Option<CacheImprovement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromptLengthGroup {
    pub prompt_length: i64,
    pub mean: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptLengthStats {
    /// Pearson r between prompt length and total latency
    pub correlation: Option<f64>,
    pub groups: Vec<PromptLengthGroup>,
}

/// Contents of latency_metrics.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub percentiles: LatencyPercentiles,
    /// Keyed by CSV column name, in configured order
    pub component_stats: ComponentBreakdown,
    pub cache_stats: CacheStats,
    pub prompt_length_stats: PromptLengthStats,
}

fn fmt_ms(v: Option<f64>) -> String {
    v.map(|v| format!("{:.2}ms", v)).unwrap_or_else(|| "n/a".to_string())
}

impl LatencyMetrics {
    pub fn print_summary(&self) {
        println!();
        println!("Latency Analysis Results:");
        for p in [50.0, 95.0, 99.0] {
            if let Some(v) = self.percentiles.get(p) {
                println!("{} latency: {:.2}ms", LatencyConfig::percentile_key(p).to_uppercase(), v);
            }
        }
        println!("Mean latency: {:.2}ms", self.percentiles.mean);

        println!();
        println!("Component Breakdown:");
        for (column, s) in self.component_stats.iter() {
            println!("{}: {:.2}ms ({:.1}%)", column, s.mean, s.percentage);
        }

        println!();
        println!("Cache Impact:");
        println!("Cache hit mean: {}", fmt_ms(self.cache_stats.cache_hit.mean));
        println!("Cache miss mean: {}", fmt_ms(self.cache_stats.cache_miss.mean));
        match &self.cache_stats.improvement {
            Some(imp) => match imp.mean_reduction_percent {
                Some(pct) => println!("Mean reduction: {:.2}ms ({:.1}%)", imp.mean_reduction, pct),
                None => println!("Mean reduction: {:.2}ms", imp.mean_reduction),
            },
            None => println!("Mean reduction: n/a (needs both cache hits and misses)"),
        }
    }
}

pub fn calculate_percentiles(table: &TimingTable, config: &LatencyConfig) -> crate::Result<LatencyPercentiles> {
    let totals = &table.total_ms;
    let (Some(min), Some(max), Some(mean)) = (stats::min(totals), stats::max(totals), stats::mean(totals))
    else {
        return Err(EvalError::empty("timing table has no rows"));
    };

    let mut sorted = totals.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let percentiles = config
        .percentiles
        .iter()
        .map(|&p| (LatencyConfig::percentile_key(p), stats::percentile_sorted(&sorted, p)))
        .collect();

    Ok(LatencyPercentiles {
        percentiles,
        min,
        max,
        mean,
        std: stats::std_sample(totals),
    })
}

pub fn analyze_components(table: &TimingTable) -> ComponentBreakdown {
    let total_sum: f64 = table.total_ms.iter().sum();
    table
        .components
        .iter()
        .map(|c| {
            let sum: f64 = c.values.iter().sum();
            let percentage = if total_sum == 0.0 { 0.0 } else { sum / total_sum * 100.0 };
            (
                c.column.clone(),
                ComponentStats {
                    label: c.label.clone(),
                    mean: stats::mean(&c.values).unwrap_or(0.0),
                    percentage,
                },
            )
        })
        .collect()
}

fn reduction_percent(reduction: f64, miss: f64) -> Option<f64> {
    if miss == 0.0 {
        None
    } else {
        Some(reduction / miss * 100.0)
    }
}

pub fn analyze_cache_impact(table: &TimingTable) -> CacheStats {
    let cache_hit = CacheGroupStats::from_values(&table.totals_where_cache(true));
    let cache_miss = CacheGroupStats::from_values(&table.totals_where_cache(false));

    let improvement = match (cache_hit.mean, cache_miss.mean, cache_hit.p50, cache_miss.p50) {
        (Some(hit_mean), Some(miss_mean), Some(hit_p50), Some(miss_p50)) => {
            let mean_reduction = miss_mean - hit_mean;
            let p50_reduction = miss_p50 - hit_p50;
            Some(CacheImprovement {
                mean_reduction,
                mean_reduction_percent: reduction_percent(mean_reduction, miss_mean),
                p50_reduction,
                p50_reduction_percent: reduction_percent(p50_reduction, miss_p50),
            })
        }
        _ => None,
    };

    CacheStats {
        cache_hit,
        cache_miss,
        improvement,
    }
}

pub fn analyze_prompt_length(table: &TimingTable) -> crate::Result<PromptLengthStats> {
    let groups = stats::group_by_key(&table.prompt_length, &table.total_ms)?
        .into_iter()
        .filter_map(|(prompt_length, values)| {
            stats::mean(&values).map(|mean| PromptLengthGroup {
                prompt_length,
                mean,
                count: values.len(),
            })
        })
        .collect();

    let lengths: Vec<f64> = table.prompt_length.iter().map(|&l| l as f64).collect();
    let correlation = stats::pearson(&lengths, &table.total_ms)?;

    Ok(PromptLengthStats { correlation, groups })
}

pub fn analyze(table: &TimingTable, config: &LatencyConfig) -> crate::Result<LatencyMetrics> {
    Ok(LatencyMetrics {
        percentiles: calculate_percentiles(table, config)?,
        component_stats: analyze_components(table),
        cache_stats: analyze_cache_impact(table),
        prompt_length_stats: analyze_prompt_length(table)?,
    })
}

#[derive(Debug, Clone)]
pub struct LatencyResult {
    pub metrics: LatencyMetrics,
    pub signature: Option<String>,
    pub files_generated: Vec<PathBuf>,
}

/// Analyzes a timing CSV and writes latency_metrics.json plus figures
pub struct LatencyStage {
    config: EvalConfig,
    output: OutputContract,
    timings_path: PathBuf,
}

impl LatencyStage {
    pub fn new(config: EvalConfig, timings_path: PathBuf, output_dir: PathBuf) -> Result<Self> {
        if !timings_path.exists() {
            bail!("Timings file not found: {}", timings_path.display());
        }
        let output = OutputContract::new(&output_dir)?;
        Ok(Self {
            config,
            output,
            timings_path,
        })
    }

    pub fn run(&self) -> Result<LatencyResult> {
        let mut files_generated = Vec::new();

        log::info!("[1/4] Loading timings from {}", self.timings_path.display());
        let table = TimingTable::load(&self.timings_path, &self.config.latency)
            .with_context(|| format!("Failed to load {}", self.timings_path.display()))?;
        if table.is_empty() {
            bail!("No timing rows in {}", self.timings_path.display());
        }
        log::info!("  Loaded {} timing measurements", table.len());

        log::info!("[2/4] Calculating percentiles, components, cache and prompt-length impact...");
        let metrics = analyze(&table, &self.config.latency)?;
        if metrics.cache_stats.improvement.is_none() {
            log::warn!("  Cache improvement unavailable: hits or misses missing");
        }

        log::info!("[3/4] Writing metrics...");
        let path = self.output.latency_metrics_json();
        let signature = write_signed_json(&path, &metrics, self.config.output.sign)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        files_generated.push(path);

        log::info!("[4/4] Generating plots...");
        if self.config.output.figures {
            files_generated.extend(self.plot(&table, &metrics)?);
        } else {
            log::info!("  Figures disabled");
        }

        if self.config.output.provenance {
            self.output.write_provenance("latency", &files_generated)?;
        }

        Ok(LatencyResult {
            metrics,
            signature,
            files_generated,
        })
    }

    fn plot(&self, table: &TimingTable, metrics: &LatencyMetrics) -> Result<Vec<PathBuf>> {
        let size = (self.config.figures.width, self.config.figures.height);
        let mut written = Vec::new();

        // Markers are fixed at P50/P95/P99 regardless of the configured set
        let markers: Vec<Marker> = [(50.0, RED), (95.0, GREEN), (99.0, BLUE)]
            .into_iter()
            .filter_map(|(p, color)| {
                stats::percentile(&table.total_ms, p)
                    .map(|v| Marker::new(LatencyConfig::percentile_key(p).to_uppercase(), v, color))
            })
            .collect();
        let path = self.output.latency_distribution_svg();
        figures::histogram(
            &path,
            size,
            "Latency Distribution",
            "Latency (ms)",
            &table.total_ms,
            self.config.figures.histogram_bins,
            &markers,
        )
        .with_context(|| format!("Failed to render {}", path.display()))?;
        written.push(path);

        let component_means: Vec<(String, f64)> = metrics
            .component_stats
            .iter()
            .map(|(_, s)| (s.label.clone(), s.mean))
            .collect();

        let bars: Vec<Bar> = component_means
            .iter()
            .map(|(label, mean)| Bar {
                label: label.clone(),
                value: *mean,
                count: None,
            })
            .collect();
        let path = self.output.component_breakdown_svg();
        figures::bar_chart(&path, size, "Latency Component Breakdown", "Average Time (ms)", &bars, None)
            .with_context(|| format!("Failed to render {}", path.display()))?;
        written.push(path);

        let path = self.output.component_distribution_svg();
        figures::pie_chart(&path, size, "Latency Component Distribution", &component_means)
            .with_context(|| format!("Failed to render {}", path.display()))?;
        written.push(path);

        let groups = vec![
            ("Cache Hit".to_string(), table.totals_where_cache(true)),
            ("Cache Miss".to_string(), table.totals_where_cache(false)),
        ];
        let path = self.output.cache_comparison_svg();
        figures::box_plot(&path, size, "Latency: Cache Hit vs Miss", "", "Latency (ms)", &groups)
            .with_context(|| format!("Failed to render {}", path.display()))?;
        written.push(path);

        let series: Vec<Series> = [(true, "Cache Hit", figures::palette(2)), (false, "Cache Miss", figures::palette(3))]
            .into_iter()
            .map(|(hit, label, color)| Series {
                label: label.to_string(),
                points: table
                    .prompt_length
                    .iter()
                    .zip(&table.total_ms)
                    .zip(&table.cache_hit)
                    .filter(|(_, h)| **h == hit)
                    .map(|((len, total), _)| (*len as f64, *total))
                    .collect(),
                color,
            })
            .collect();
        let path = self.output.prompt_length_impact_svg();
        figures::scatter(
            &path,
            size,
            "Latency vs Prompt Length",
            "Prompt Length (chars)",
            "Latency (ms)",
            &series,
        )
        .with_context(|| format!("Failed to render {}", path.display()))?;
        written.push(path);

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::ComponentColumn;

    const EPS: f64 = 1e-9;

    fn table(total: &[f64], hits: &[bool], lengths: &[i64]) -> TimingTable {
        TimingTable {
            total_ms: total.to_vec(),
            cache_hit: hits.to_vec(),
            prompt_length: lengths.to_vec(),
            components: vec![
                ComponentColumn {
                    column: "parsing_time_ms".into(),
                    label: "Parsing".into(),
                    values: total.iter().map(|t| t * 0.25).collect(),
                },
                ComponentColumn {
                    column: "generation_time_ms".into(),
                    label: "Generation".into(),
                    values: total.iter().map(|t| t * 0.75).collect(),
                },
            ],
        }
    }

    #[test]
    fn test_percentiles_of_known_sequence() {
        let totals: Vec<f64> = (1..=10).map(|i| i as f64 * 10.0).collect();
        let t = table(&totals, &[true; 10], &[100; 10]);
        let p = calculate_percentiles(&t, &LatencyConfig::default()).unwrap();

        assert!((p.get(50.0).unwrap() - 55.0).abs() < EPS);
        assert!((p.get(90.0).unwrap() - 91.0).abs() < EPS);
        assert_eq!(p.min, 10.0);
        assert_eq!(p.max, 100.0);
        assert!((p.mean - 55.0).abs() < EPS);
        assert!(p.std.is_some());
    }

    #[test]
    fn test_single_row_has_no_std() {
        let t = table(&[42.0], &[false], &[10]);
        let p = calculate_percentiles(&t, &LatencyConfig::default()).unwrap();
        assert_eq!(p.std, None);
        assert_eq!(p.get(99.0), Some(42.0));
    }

    #[test]
    fn test_component_percentages() {
        let t = table(&[100.0, 200.0], &[true, false], &[1, 2]);
        let c = analyze_components(&t);
        assert!((c["parsing_time_ms"].percentage - 25.0).abs() < EPS);
        assert!((c["generation_time_ms"].percentage - 75.0).abs() < EPS);
        assert!((c["parsing_time_ms"].mean - 37.5).abs() < EPS);
    }

    #[test]
    fn test_components_keep_configured_order() {
        let t = table(&[100.0, 200.0], &[true, false], &[1, 2]);
        let m = analyze(&t, &LatencyConfig::default()).unwrap();
        assert_eq!(m.component_stats.columns(), vec!["parsing_time_ms", "generation_time_ms"]);

        // Pretty output lists parsing before generation, not alphabetically
        let pretty = serde_json::to_string_pretty(&m).unwrap();
        let parsing = pretty.find("\"parsing_time_ms\"").unwrap();
        let generation = pretty.find("\"generation_time_ms\"").unwrap();
        assert!(parsing < generation);

        let json = serde_json::to_string(&m.component_stats).unwrap();
        let back: ComponentBreakdown = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m.component_stats);
    }

    #[test]
    fn test_cache_impact() {
        let t = table(&[50.0, 70.0, 200.0, 300.0], &[true, true, false, false], &[1, 1, 1, 1]);
        let c = analyze_cache_impact(&t);

        assert_eq!(c.cache_hit.count, 2);
        assert_eq!(c.cache_hit.mean, Some(60.0));
        assert_eq!(c.cache_miss.mean, Some(250.0));
        let imp = c.improvement.unwrap();
        assert!((imp.mean_reduction - 190.0).abs() < EPS);
        assert!((imp.mean_reduction_percent.unwrap() - 76.0).abs() < EPS);
        assert!((imp.p50_reduction - 190.0).abs() < EPS);
    }

    #[test]
    fn test_cache_impact_without_misses() {
        let t = table(&[50.0, 70.0], &[true, true], &[1, 2]);
        let c = analyze_cache_impact(&t);
        assert_eq!(c.cache_miss.count, 0);
        assert_eq!(c.cache_miss.mean, None);
        assert!(c.improvement.is_none());
    }

    #[test]
    fn test_prompt_length_groups_and_correlation() {
        let t = table(&[10.0, 20.0, 30.0, 50.0], &[true; 4], &[100, 200, 300, 300]);
        let s = analyze_prompt_length(&t).unwrap();

        assert_eq!(s.groups.len(), 3);
        assert_eq!(s.groups[2].prompt_length, 300);
        assert_eq!(s.groups[2].count, 2);
        assert!((s.groups[2].mean - 40.0).abs() < EPS);
        assert!(s.correlation.unwrap() > 0.8);
    }

    #[test]
    fn test_empty_table_is_error() {
        let t = table(&[], &[], &[]);
        assert!(analyze(&t, &LatencyConfig::default()).is_err());
    }

    #[test]
    fn test_metrics_json_layout() {
        let t = table(&[10.0, 20.0], &[true, false], &[5, 6]);
        let m = analyze(&t, &LatencyConfig::default()).unwrap();
        let v = serde_json::to_value(&m).unwrap();

        assert!(v["percentiles"]["p95"].is_number());
        assert!(v["percentiles"]["std"].is_number());
        assert!(v["cache_stats"]["improvement"]["mean_reduction"].is_number());
        assert!(v["prompt_length_stats"]["groups"].is_array());
    }
}
