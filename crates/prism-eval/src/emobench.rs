//! EmoBench analysis: emotion confusion matrix and safety/empathy scores

use crate::classification::{ClassificationReport, ConfusionMatrix};
use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::figures::{self, Marker};
use crate::inputs::{read_jsonl, EmotionPrediction};
use crate::outputs::OutputContract;
use crate::signing::write_signed_json;
use crate::stats::{self, Summary};
use anyhow::{bail, Context, Result};
use plotters::style::RED;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Contents of confusion_matrix.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrixJson {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<u64>>,
    pub normalized: Vec<Vec<f64>>,
}

impl From<&ConfusionMatrix> for ConfusionMatrixJson {
    fn from(cm: &ConfusionMatrix) -> Self {
        Self {
            labels: cm.labels.clone(),
            counts: cm.counts.clone(),
            normalized: cm.normalized(),
        }
    }
}

/// Contents of score_statistics.json
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreStatistics {
    pub safety_score: Summary,
    pub empathy_score: Summary,
}

/// Contents of metrics.json
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmoBenchMetrics {
    pub total_prompts: usize,
    pub safety_score_avg: f64,
    pub empathy_score_avg: f64,
    pub macro_f1: f64,
}

impl EmoBenchMetrics {
    pub fn print_summary(&self) {
        println!();
        println!("EmoBench Evaluation Results:");
        println!("Total prompts: {}", self.total_prompts);
        println!("Average safety score: {:.4}", self.safety_score_avg);
        println!("Average empathy score: {:.4}", self.empathy_score_avg);
        println!("Macro F1 score: {:.4}", self.macro_f1);
    }
}

/// Everything computed from one predictions file
#[derive(Debug, Clone)]
pub struct EmoBenchAnalysis {
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    pub scores: ScoreStatistics,
    pub metrics: EmoBenchMetrics,
}

pub fn analyze(predictions: &[EmotionPrediction]) -> crate::Result<EmoBenchAnalysis> {
    if predictions.is_empty() {
        return Err(EvalError::empty("no EmoBench predictions"));
    }

    let truth: Vec<&str> = predictions.iter().map(|p| p.emotion_category.as_str()).collect();
    let predicted: Vec<&str> = predictions.iter().map(|p| p.predicted_label()).collect();
    let confusion = ConfusionMatrix::new(&truth, &predicted)?;
    let report = ClassificationReport::from_confusion(&confusion)?;

    let safety: Vec<f64> = predictions.iter().map(|p| p.safety_score).collect();
    let empathy: Vec<f64> = predictions.iter().map(|p| p.empathy_score).collect();
    let scores = ScoreStatistics {
        safety_score: Summary::from_values(&safety)?,
        empathy_score: Summary::from_values(&empathy)?,
    };

    let metrics = EmoBenchMetrics {
        total_prompts: predictions.len(),
        safety_score_avg: scores.safety_score.mean,
        empathy_score_avg: scores.empathy_score.mean,
        macro_f1: report.macro_f1(),
    };

    Ok(EmoBenchAnalysis {
        confusion,
        report,
        scores,
        metrics,
    })
}

/// Scores grouped by true emotion, sorted by emotion name
pub fn scores_by_emotion(
    predictions: &[EmotionPrediction],
    score: fn(&EmotionPrediction) -> f64,
) -> crate::Result<Vec<(String, Vec<f64>)>> {
    let keys: Vec<String> = predictions.iter().map(|p| p.emotion_category.clone()).collect();
    let values: Vec<f64> = predictions.iter().map(score).collect();
    Ok(stats::group_by_key(&keys, &values)?.into_iter().collect())
}

#[derive(Debug, Clone)]
pub struct EmoBenchResult {
    pub analysis: EmoBenchAnalysis,
    pub files_generated: Vec<PathBuf>,
}

/// Builds the confusion matrix, score statistics and figures
pub struct EmoBenchStage {
    config: EvalConfig,
    output: OutputContract,
    predictions_path: PathBuf,
}

impl EmoBenchStage {
    pub fn new(config: EvalConfig, predictions_path: PathBuf, output_dir: PathBuf) -> Result<Self> {
        if !predictions_path.exists() {
            bail!("Predictions file not found: {}", predictions_path.display());
        }
        let output = OutputContract::new(&output_dir)?;
        Ok(Self {
            config,
            output,
            predictions_path,
        })
    }

    fn write_json<T: Serialize>(&self, path: PathBuf, data: &T, files: &mut Vec<PathBuf>) -> Result<()> {
        write_signed_json(&path, data, self.config.output.sign)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        files.push(path);
        Ok(())
    }

    pub fn run(&self) -> Result<EmoBenchResult> {
        let mut files_generated = Vec::new();

        log::info!("[1/4] Loading predictions from {}", self.predictions_path.display());
        let predictions: Vec<EmotionPrediction> = read_jsonl(&self.predictions_path)
            .with_context(|| format!("Failed to load {}", self.predictions_path.display()))?;
        if predictions.is_empty() {
            bail!("No predictions in {}", self.predictions_path.display());
        }
        log::info!("  Loaded {} predictions", predictions.len());
        let with_prediction = predictions.iter().filter(|p| p.predicted_emotion.is_some()).count();
        if with_prediction == 0 {
            log::warn!("  No predicted_emotion fields; confusion matrix assumes every label is correct");
        }

        log::info!("[2/4] Generating confusion matrix...");
        let analysis = analyze(&predictions)?;
        log::info!("  {} emotion labels", analysis.confusion.len());
        self.write_json(
            self.output.confusion_matrix_json(),
            &ConfusionMatrixJson::from(&analysis.confusion),
            &mut files_generated,
        )?;
        self.write_json(
            self.output.classification_report_json(),
            &analysis.report,
            &mut files_generated,
        )?;

        log::info!("[3/4] Analyzing safety and empathy scores...");
        self.write_json(
            self.output.score_statistics_json(),
            &analysis.scores,
            &mut files_generated,
        )?;
        self.write_json(self.output.metrics_json(), &analysis.metrics, &mut files_generated)?;

        log::info!("[4/4] Generating figures...");
        if self.config.output.figures {
            files_generated.extend(self.plot(&predictions, &analysis)?);
        } else {
            log::info!("  Figures disabled");
        }

        if self.config.output.provenance {
            self.output.write_provenance("emobench", &files_generated)?;
        }

        Ok(EmoBenchResult {
            analysis,
            files_generated,
        })
    }

    fn plot(&self, predictions: &[EmotionPrediction], analysis: &EmoBenchAnalysis) -> Result<Vec<PathBuf>> {
        let size = (self.config.figures.width, self.config.figures.height);
        let bins = self.config.figures.histogram_bins;
        let mut written = Vec::new();

        let path = self.output.confusion_matrix_svg();
        figures::heatmap(
            &path,
            size,
            "Emotion Classification Confusion Matrix",
            &analysis.confusion.labels,
            &analysis.confusion.counts,
        )
        .with_context(|| format!("Failed to render {}", path.display()))?;
        written.push(path);

        let kinds: [(&str, &str, fn(&EmotionPrediction) -> f64, &Summary); 2] = [
            ("safety", "Safety", |p| p.safety_score, &analysis.scores.safety_score),
            ("empathy", "Empathy", |p| p.empathy_score, &analysis.scores.empathy_score),
        ];

        for (kind, title, score, summary) in kinds {
            let values: Vec<f64> = predictions.iter().map(score).collect();

            let path = self.output.score_distribution_svg(kind);
            figures::histogram(
                &path,
                size,
                &format!("{} Score Distribution", title),
                &format!("{} Score", title),
                &values,
                bins,
                &[Marker::new("Mean", summary.mean, RED)],
            )
            .with_context(|| format!("Failed to render {}", path.display()))?;
            written.push(path);

            let groups = scores_by_emotion(predictions, score)?;
            let path = self.output.score_by_emotion_svg(kind);
            figures::box_plot(
                &path,
                size,
                &format!("{} Scores by Emotion Category", title),
                "Emotion Category",
                &format!("{} Score", title),
                &groups,
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

    const EPS: f64 = 1e-9;

    fn pred(id: &str, emotion: &str, safety: f64, empathy: f64, predicted: Option<&str>) -> EmotionPrediction {
        EmotionPrediction {
            prompt_id: id.into(),
            emotion_category: emotion.to_string(),
            safety_score: safety,
            empathy_score: empathy,
            predicted_emotion: predicted.map(str::to_string),
        }
    }

    #[test]
    fn test_identity_predictions() {
        let preds = vec![
            pred("1", "joy", 1.0, 0.8, None),
            pred("2", "sadness", 0.5, 0.6, None),
            pred("3", "joy", 0.0, 0.4, None),
        ];
        let a = analyze(&preds).unwrap();

        assert_eq!(a.confusion.labels, vec!["joy", "sadness"]);
        assert!((a.metrics.macro_f1 - 1.0).abs() < EPS);
        assert!((a.metrics.safety_score_avg - 0.5).abs() < EPS);
        assert!((a.metrics.empathy_score_avg - 0.6).abs() < EPS);
        assert_eq!(a.metrics.total_prompts, 3);
    }

    #[test]
    fn test_predicted_emotion_used_when_present() {
        let preds = vec![
            pred("1", "joy", 1.0, 1.0, Some("joy")),
            pred("2", "fear", 1.0, 1.0, Some("joy")),
        ];
        let a = analyze(&preds).unwrap();
        assert!((a.report.accuracy - 0.5).abs() < EPS);
        assert!(a.metrics.macro_f1 < 1.0);
    }

    #[test]
    fn test_score_statistics_population_std() {
        let preds = vec![
            pred("1", "a", 2.0, 0.0, None),
            pred("2", "a", 4.0, 0.0, None),
        ];
        let a = analyze(&preds).unwrap();
        assert!((a.scores.safety_score.std - 1.0).abs() < EPS);
        assert_eq!(a.scores.empathy_score.std, 0.0);
    }

    #[test]
    fn test_scores_by_emotion_grouping() {
        let preds = vec![
            pred("1", "joy", 0.9, 0.1, None),
            pred("2", "anger", 0.2, 0.3, None),
            pred("3", "joy", 0.7, 0.5, None),
        ];
        let groups = scores_by_emotion(&preds, |p| p.safety_score).unwrap();
        assert_eq!(groups[0], ("anger".to_string(), vec![0.2]));
        assert_eq!(groups[1], ("joy".to_string(), vec![0.9, 0.7]));
    }

    #[test]
    fn test_empty_is_error() {
        assert!(analyze(&[]).is_err());
    }
}
