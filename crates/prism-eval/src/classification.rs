//! Confusion matrix and per-label classification report

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Square count matrix indexed `[true][predicted]` over a sorted label set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Labels are the sorted union of both sequences.
    pub fn new<S: AsRef<str>>(true_labels: &[S], predicted_labels: &[S]) -> Result<Self> {
        if true_labels.len() != predicted_labels.len() {
            return Err(EvalError::LengthMismatch {
                left: true_labels.len(),
                right: predicted_labels.len(),
            });
        }

        let labels: Vec<String> = true_labels
            .iter()
            .chain(predicted_labels)
            .map(|s| s.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let mut counts = vec![vec![0u64; labels.len()]; labels.len()];
        for (t, p) in true_labels.iter().zip(predicted_labels) {
            let ti = index[t.as_ref()];
            let pi = index[p.as_ref()];
            counts[ti][pi] += 1;
        }

        Ok(Self { labels, counts })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Total number of samples
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Rows divided by their sums; an all-zero row stays zero.
    pub fn normalized(&self) -> Vec<Vec<f64>> {
        self.counts
            .iter()
            .map(|row| {
                let sum: u64 = row.iter().sum();
                row.iter()
                    .map(|&c| if sum == 0 { 0.0 } else { c as f64 / sum as f64 })
                    .collect()
            })
            .collect()
    }

    fn true_positives(&self, i: usize) -> u64 {
        self.counts[i][i]
    }

    fn row_sum(&self, i: usize) -> u64 {
        self.counts[i].iter().sum()
    }

    fn column_sum(&self, j: usize) -> u64 {
        self.counts.iter().map(|row| row[j]).sum()
    }
}

/// Precision/recall/F1 for one label or one average
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: u64,
}

/// Report laid out like scikit-learn's `classification_report(output_dict=True)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    #[serde(flatten)]
    pub per_label: BTreeMap<String, ClassMetrics>,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Result<Self> {
        let total = cm.total();
        if total == 0 {
            return Err(EvalError::empty("classification report needs at least one sample"));
        }

        let mut per_label = BTreeMap::new();
        let mut correct = 0u64;
        for (i, label) in cm.labels.iter().enumerate() {
            let tp = cm.true_positives(i);
            correct += tp;
            let precision = ratio(tp, cm.column_sum(i));
            let recall = ratio(tp, cm.row_sum(i));
            per_label.insert(
                label.clone(),
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1(precision, recall),
                    support: cm.row_sum(i),
                },
            );
        }

        let n = per_label.len() as f64;
        let macro_avg = ClassMetrics {
            precision: per_label.values().map(|m| m.precision).sum::<f64>() / n,
            recall: per_label.values().map(|m| m.recall).sum::<f64>() / n,
            f1_score: per_label.values().map(|m| m.f1_score).sum::<f64>() / n,
            support: total,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            per_label
                .values()
                .map(|m| f(m) * m.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1_score: weighted(|m| m.f1_score),
            support: total,
        };

        Ok(Self {
            per_label,
            accuracy: correct as f64 / total as f64,
            macro_avg,
            weighted_avg,
        })
    }

    pub fn macro_f1(&self) -> f64 {
        self.macro_avg.f1_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_confusion_counts_and_labels() {
        let truth = ["joy", "sad", "joy", "anger"];
        let pred = ["joy", "joy", "joy", "anger"];
        let cm = ConfusionMatrix::new(&truth, &pred).unwrap();

        assert_eq!(cm.labels, vec!["anger", "joy", "sad"]);
        assert_eq!(cm.counts[1][1], 2); // joy -> joy
        assert_eq!(cm.counts[2][1], 1); // sad -> joy
        assert_eq!(cm.total(), 4);
    }

    #[test]
    fn test_identity_predictions_give_perfect_report() {
        let labels = ["fear", "joy", "joy", "sadness"];
        let cm = ConfusionMatrix::new(&labels, &labels).unwrap();
        let report = ClassificationReport::from_confusion(&cm).unwrap();

        assert!((report.accuracy - 1.0).abs() < EPS);
        assert!((report.macro_f1() - 1.0).abs() < EPS);
        assert_eq!(report.per_label["joy"].support, 2);

        let norm = cm.normalized();
        for (i, row) in norm.iter().enumerate() {
            assert!((row[i] - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_report_values() {
        // a: 2 true (1 correct), b: 2 true (2 correct), one a predicted as b
        let truth = ["a", "a", "b", "b"];
        let pred = ["a", "b", "b", "b"];
        let cm = ConfusionMatrix::new(&truth, &pred).unwrap();
        let r = ClassificationReport::from_confusion(&cm).unwrap();

        let a = r.per_label["a"];
        assert!((a.precision - 1.0).abs() < EPS);
        assert!((a.recall - 0.5).abs() < EPS);
        assert!((a.f1_score - 2.0 / 3.0).abs() < EPS);

        let b = r.per_label["b"];
        assert!((b.precision - 2.0 / 3.0).abs() < EPS);
        assert!((b.recall - 1.0).abs() < EPS);
        assert!((b.f1_score - 0.8).abs() < EPS);

        assert!((r.accuracy - 0.75).abs() < EPS);
        assert!((r.macro_f1() - (2.0 / 3.0 + 0.8) / 2.0).abs() < EPS);
    }

    #[test]
    fn test_predicted_only_label_has_zero_row() {
        let cm = ConfusionMatrix::new(&["a", "a"], &["a", "z"]).unwrap();
        let norm = cm.normalized();
        assert_eq!(cm.labels, vec!["a", "z"]);
        assert_eq!(norm[1], vec![0.0, 0.0]);

        let r = ClassificationReport::from_confusion(&cm).unwrap();
        assert_eq!(r.per_label["z"].support, 0);
        assert_eq!(r.per_label["z"].recall, 0.0);
    }

    #[test]
    fn test_report_json_layout() {
        let cm = ConfusionMatrix::new(&["x", "y"], &["x", "y"]).unwrap();
        let r = ClassificationReport::from_confusion(&cm).unwrap();
        let json = serde_json::to_value(&r).unwrap();

        assert!(json.get("x").is_some());
        assert!(json.get("accuracy").is_some());
        assert!(json["macro avg"].get("f1-score").is_some());
        assert!(json["weighted avg"].get("support").is_some());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(ConfusionMatrix::new(&["a"], &["a", "b"]).is_err());
    }
}
