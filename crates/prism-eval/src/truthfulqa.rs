//! TruthfulQA prediction scoring
//!
//! Accuracy is the mean of per-question scores, overall and per category.
//! Ground truth, when supplied, is joined on `question_id` and may override
//! the prediction's category.

use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::figures::{self, Bar};
use crate::inputs::{read_ground_truth, read_jsonl, GroundTruth, Prediction};
use crate::outputs::OutputContract;
use crate::signing::write_signed_json;
use crate::stats;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Accuracy of one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub accuracy: f64,
    pub count: usize,
}

/// Contents of metrics.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthfulQaMetrics {
    pub accuracy: f64,
    pub count: usize,
    /// `None` when no prediction carries a category
    pub categories: Option<BTreeMap<String, CategoryMetrics>>,
}

impl TruthfulQaMetrics {
    /// Categories by accuracy, highest first; ties by name
    pub fn sorted_categories(&self) -> Vec<(&str, CategoryMetrics)> {
        let mut cats: Vec<(&str, CategoryMetrics)> = self
            .categories
            .iter()
            .flatten()
            .map(|(name, m)| (name.as_str(), *m))
            .collect();
        cats.sort_by(|a, b| b.1.accuracy.total_cmp(&a.1.accuracy).then(a.0.cmp(b.0)));
        cats
    }

    pub fn print_summary(&self) {
        println!();
        println!("TruthfulQA Evaluation Results:");
        println!("Accuracy: {:.4}", self.accuracy);
        println!("Total questions: {}", self.count);

        let cats = self.sorted_categories();
        if !cats.is_empty() {
            println!();
            println!("Category-wise Accuracy:");
            for (name, m) in cats {
                println!("{}: {:.4} (n={})", name, m.accuracy, m.count);
            }
        }
    }
}

/// Attach ground truth to predictions by `question_id`, compared as
/// [`RecordId::key`](crate::inputs::RecordId::key).
///
/// Returns how many predictions had no ground-truth row.
pub fn merge_ground_truth(
    predictions: &mut [Prediction],
    ground_truth: &HashMap<String, GroundTruth>,
) -> usize {
    let mut unmatched = 0;
    for pred in predictions.iter_mut() {
        match ground_truth.get(&pred.question_id.key()) {
            Some(gt) => {
                pred.ground_truth = Some(gt.ground_truth.clone());
                if let Some(category) = &gt.category {
                    pred.category = Some(category.clone());
                }
            }
            None => unmatched += 1,
        }
    }
    unmatched
}

/// Overall and per-category accuracy
pub fn compute_metrics(predictions: &[Prediction]) -> crate::Result<TruthfulQaMetrics> {
    let scores: Vec<f64> = predictions.iter().map(|p| p.score).collect();
    let accuracy =
        stats::mean(&scores).ok_or_else(|| EvalError::empty("no TruthfulQA predictions"))?;

    let mut by_category: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for pred in predictions {
        if let Some(category) = &pred.category {
            by_category.entry(category.clone()).or_default().push(pred.score);
        }
    }

    let categories = if by_category.is_empty() {
        None
    } else {
        Some(
            by_category
                .into_iter()
                .filter_map(|(name, scores)| {
                    stats::mean(&scores).map(|accuracy| {
                        (
                            name,
                            CategoryMetrics {
                                accuracy,
                                count: scores.len(),
                            },
                        )
                    })
                })
                .collect(),
        )
    };

    Ok(TruthfulQaMetrics {
        accuracy,
        count: predictions.len(),
        categories,
    })
}

/// Result of a scoring run
#[derive(Debug, Clone)]
pub struct TruthfulQaResult {
    pub metrics: TruthfulQaMetrics,
    pub signature: Option<String>,
    pub files_generated: Vec<PathBuf>,
}

/// Scores a predictions file and writes metrics and figures
pub struct TruthfulQaStage {
    config: EvalConfig,
    output: OutputContract,
    predictions_path: PathBuf,
    ground_truth_path: Option<PathBuf>,
}

impl TruthfulQaStage {
    pub fn new(
        config: EvalConfig,
        predictions_path: PathBuf,
        ground_truth_path: Option<PathBuf>,
        output_dir: PathBuf,
    ) -> Result<Self> {
        if !predictions_path.exists() {
            bail!("Predictions file not found: {}", predictions_path.display());
        }
        if let Some(gt) = &ground_truth_path {
            if !gt.exists() {
                bail!("Ground truth file not found: {}", gt.display());
            }
        }
        let output = OutputContract::new(&output_dir)?;
        Ok(Self {
            config,
            output,
            predictions_path,
            ground_truth_path,
        })
    }

    pub fn run(&self) -> Result<TruthfulQaResult> {
        let mut files_generated = Vec::new();

        log::info!("[1/4] Loading predictions from {}", self.predictions_path.display());
        let mut predictions: Vec<Prediction> = read_jsonl(&self.predictions_path)
            .with_context(|| format!("Failed to load {}", self.predictions_path.display()))?;
        if predictions.is_empty() {
            bail!("No predictions in {}", self.predictions_path.display());
        }
        log::info!("  Loaded {} predictions", predictions.len());

        log::info!("[2/4] Merging ground truth...");
        match &self.ground_truth_path {
            Some(path) => {
                let ground_truth = read_ground_truth(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                log::info!("  Loaded {} ground truth items", ground_truth.len());
                let unmatched = merge_ground_truth(&mut predictions, &ground_truth);
                log::debug!("  {} predictions without ground truth", unmatched);
            }
            None => log::info!("  No ground truth supplied"),
        }

        log::info!("[3/4] Calculating metrics...");
        let metrics = compute_metrics(&predictions)?;
        let metrics_path = self.output.metrics_json();
        let signature = write_signed_json(&metrics_path, &metrics, self.config.output.sign)
            .with_context(|| format!("Failed to write {}", metrics_path.display()))?;
        files_generated.push(metrics_path);

        log::info!("[4/4] Generating figures...");
        if self.config.output.figures {
            files_generated.extend(self.plot(&metrics)?);
        } else {
            log::info!("  Figures disabled");
        }

        if self.config.output.provenance {
            self.output.write_provenance("truthfulqa", &files_generated)?;
        }

        Ok(TruthfulQaResult {
            metrics,
            signature,
            files_generated,
        })
    }

    fn plot(&self, metrics: &TruthfulQaMetrics) -> Result<Vec<PathBuf>> {
        let size = (self.config.figures.width, self.config.figures.height);
        let mut written = Vec::new();

        let path = self.output.truthfulqa_accuracy_svg();
        figures::bar_chart(
            &path,
            size,
            &format!("TruthfulQA Accuracy: {:.2}%", metrics.accuracy * 100.0),
            "Accuracy",
            &[Bar {
                label: "TruthfulQA Accuracy".to_string(),
                value: metrics.accuracy,
                count: None,
            }],
            Some(1.0),
        )
        .with_context(|| format!("Failed to render {}", path.display()))?;
        written.push(path);

        let cats = metrics.sorted_categories();
        if !cats.is_empty() {
            let bars: Vec<Bar> = cats
                .into_iter()
                .map(|(name, m)| Bar {
                    label: name.to_string(),
                    value: m.accuracy,
                    count: Some(m.count),
                })
                .collect();
            let path = self.output.truthfulqa_category_accuracy_svg();
            figures::bar_chart(
                &path,
                size,
                "TruthfulQA Accuracy by Category",
                "Accuracy",
                &bars,
                Some(1.0),
            )
            .with_context(|| format!("Failed to render {}", path.display()))?;
            written.push(path);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::RecordId;
    use serde_json::json;

    const EPS: f64 = 1e-9;

    fn pred(id: &str, score: f64, category: Option<&str>) -> Prediction {
        Prediction {
            question_id: id.into(),
            score,
            category: category.map(str::to_string),
            ground_truth: None,
        }
    }

    #[test]
    fn test_accuracy_k_of_n() {
        let preds: Vec<Prediction> = (0..8)
            .map(|i| pred(&format!("q{i}"), if i < 6 { 1.0 } else { 0.0 }, None))
            .collect();
        let m = compute_metrics(&preds).unwrap();
        assert!((m.accuracy - 0.75).abs() < EPS);
        assert_eq!(m.count, 8);
        assert!(m.categories.is_none());
    }

    #[test]
    fn test_category_breakdown_sorted() {
        let preds = vec![
            pred("1", 1.0, Some("Health")),
            pred("2", 0.0, Some("Health")),
            pred("3", 1.0, Some("Law")),
            pred("4", 0.0, Some("Fiction")),
            pred("5", 1.0, None),
        ];
        let m = compute_metrics(&preds).unwrap();
        let cats = m.categories.as_ref().unwrap();
        assert_eq!(cats.len(), 3);
        assert_eq!(cats["Health"].count, 2);
        assert!((cats["Health"].accuracy - 0.5).abs() < EPS);

        let order: Vec<&str> = m.sorted_categories().into_iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["Law", "Health", "Fiction"]);
    }

    #[test]
    fn test_merge_ground_truth_overrides_category() {
        let mut preds = vec![pred("q1", 1.0, Some("Old")), pred("q2", 0.0, None)];
        let mut gt = HashMap::new();
        gt.insert(
            "q1".to_string(),
            GroundTruth {
                question_id: "q1".into(),
                ground_truth: json!("Paris"),
                category: Some("Geography".into()),
            },
        );

        let unmatched = merge_ground_truth(&mut preds, &gt);
        assert_eq!(unmatched, 1);
        assert_eq!(preds[0].category.as_deref(), Some("Geography"));
        assert_eq!(preds[0].ground_truth, Some(json!("Paris")));
        assert!(preds[1].ground_truth.is_none());
    }

    #[test]
    fn test_merge_joins_integer_ids() {
        let mut preds = vec![
            Prediction {
                question_id: RecordId::Int(1),
                score: 1.0,
                category: None,
                ground_truth: None,
            },
            pred("2", 0.0, None),
        ];
        let mut gt = HashMap::new();
        for (id, cat) in [(RecordId::Int(1), "Health"), (RecordId::Int(2), "Law")] {
            gt.insert(
                id.key(),
                GroundTruth {
                    question_id: id,
                    ground_truth: json!(true),
                    category: Some(cat.into()),
                },
            );
        }

        // Integer 1 joins integer 1; string "2" joins integer 2
        assert_eq!(merge_ground_truth(&mut preds, &gt), 0);
        assert_eq!(preds[0].category.as_deref(), Some("Health"));
        assert_eq!(preds[1].category.as_deref(), Some("Law"));
    }

    #[test]
    fn test_empty_predictions_error() {
        assert!(compute_metrics(&[]).is_err());
    }

    #[test]
    fn test_metrics_json_layout() {
        let m = compute_metrics(&[pred("1", 1.0, None)]).unwrap();
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["count"], json!(1));
        assert!(v["categories"].is_null());
    }
}
