//! Metrics Module for Model Evaluation
//!
//! Confusion matrix, per-class precision/recall/F1 and the classification
//! report printed after the final training epoch.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// Class name
    pub class_name: String,

    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize, class_name: &str) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually another
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as another
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: class_name.to_string(),
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Averaged precision/recall/F1 row of a report
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Per-class and averaged metrics over one set of predictions.
///
/// Macro averages run over every class in the taxonomy, including classes
/// with zero support, matching the usual `classification_report` layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub total_samples: usize,
    pub confusion_matrix: ConfusionMatrix,
}

impl ClassificationReport {
    /// Build a report from flat (predicted, actual) label lists
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        class_names: &[String],
    ) -> Self {
        let num_classes = class_names.len();
        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let per_class: Vec<ClassMetrics> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| ClassMetrics::from_confusion_matrix(&confusion_matrix, idx, name))
            .collect();

        let macro_avg = if num_classes > 0 {
            let n = num_classes as f64;
            AveragedMetrics {
                precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n,
                recall: per_class.iter().map(|m| m.recall).sum::<f64>() / n,
                f1: per_class.iter().map(|m| m.f1).sum::<f64>() / n,
            }
        } else {
            AveragedMetrics::default()
        };

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted_avg = if total_support > 0 {
            let weighted = |f: fn(&ClassMetrics) -> f64| {
                per_class
                    .iter()
                    .map(|m| f(m) * m.support as f64)
                    .sum::<f64>()
                    / total_support as f64
            };
            AveragedMetrics {
                precision: weighted(|m| m.precision),
                recall: weighted(|m| m.recall),
                f1: weighted(|m| m.f1),
            }
        } else {
            AveragedMetrics::default()
        };

        Self {
            accuracy: confusion_matrix.accuracy(),
            total_samples: confusion_matrix.total(),
            per_class,
            macro_avg,
            weighted_avg,
            confusion_matrix,
        }
    }

    /// Render as an aligned text table
    pub fn display(&self) -> String {
        let name_width = self
            .per_class
            .iter()
            .map(|m| m.class_name.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        let mut output = String::new();
        output.push_str(&format!(
            "{:>w$} {:>10} {:>10} {:>10} {:>10}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            w = name_width
        ));

        for m in &self.per_class {
            output.push_str(&format!(
                "{:>w$} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
                m.class_name,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                w = name_width
            ));
        }

        output.push('\n');
        output.push_str(&format!(
            "{:>w$} {:>10} {:>10} {:>10.4} {:>10}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_samples,
            w = name_width
        ));
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            output.push_str(&format!(
                "{:>w$} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
                label,
                avg.precision,
                avg.recall,
                avg.f1,
                self.total_samples,
                w = name_width
            ));
        }

        output
    }

    /// Write the text table to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.display())
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,

    /// Row = actual, column = predicted, stored row-major
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction; out-of-range labels are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Save as CSV with class names as headers
    pub fn save_csv(&self, path: &Path, class_names: &[String]) -> std::io::Result<()> {
        let name = |idx: usize| {
            class_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| idx.to_string())
        };

        let mut content = String::from("actual\\predicted");
        for col in 0..self.num_classes {
            content.push_str(&format!(",{}", name(col)));
        }
        content.push('\n');

        for row in 0..self.num_classes {
            content.push_str(&name(row));
            for col in 0..self.num_classes {
                content.push_str(&format!(",{}", self.get(row, col)));
            }
            content.push('\n');
        }

        std::fs::write(path, content)
    }
}

/// Running average for tracking loss during an epoch
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }
}

/// Correct/total counter
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    correct: usize,
    total: usize,
}

impl AccuracyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch result
    pub fn add(&mut self, correct: usize, total: usize) {
        self.correct += correct;
        self.total += total;
    }

    /// Fraction correct; 0.0 when nothing was counted
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{}", i)).collect()
    }

    #[test]
    fn test_confusion_matrix_counts() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1, 2], &[0, 1, 2, 2], 3);
        assert_eq!(cm.get(2, 1), 1);
        assert_eq!(cm.correct(), 3);
        assert_eq!(cm.total(), 4);
        assert!((cm.accuracy() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix_ignores_out_of_range() {
        let mut cm = ConfusionMatrix::new(2);
        cm.add(5, 0);
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn test_class_metrics() {
        // actual:    0 0 1 1
        // predicted: 0 1 1 1
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1, 1], &[0, 0, 1, 1], 2);
        let m0 = ClassMetrics::from_confusion_matrix(&cm, 0, "a");
        let m1 = ClassMetrics::from_confusion_matrix(&cm, 1, "b");

        assert_eq!(m0.precision, 1.0);
        assert_eq!(m0.recall, 0.5);
        assert!((m0.f1 - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m0.support, 2);

        assert!((m1.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m1.recall, 1.0);
    }

    #[test]
    fn test_report_averages() {
        let report = ClassificationReport::from_predictions(&[0, 1, 1, 1], &[0, 0, 1, 1], &names(2));

        assert_eq!(report.total_samples, 4);
        assert!((report.accuracy - 0.75).abs() < 1e-12);
        let expected_macro_recall = (0.5 + 1.0) / 2.0;
        assert!((report.macro_avg.recall - expected_macro_recall).abs() < 1e-12);
        // equal supports, so weighted == macro
        assert!((report.weighted_avg.f1 - report.macro_avg.f1).abs() < 1e-12);
    }

    #[test]
    fn test_report_zero_support_class_counts_in_macro() {
        let report = ClassificationReport::from_predictions(&[0, 0], &[0, 0], &names(2));
        assert_eq!(report.per_class[1].support, 0);
        assert!((report.macro_avg.precision - 0.5).abs() < 1e-12);
        assert!((report.weighted_avg.precision - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_report_display_lists_every_class() {
        let report = ClassificationReport::from_predictions(&[0, 1], &[0, 1], &names(2));
        let text = report.display();
        assert!(text.contains("class_0"));
        assert!(text.contains("class_1"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("1.0000"));
    }

    #[test]
    fn test_confusion_matrix_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.csv");
        let cm = ConfusionMatrix::from_predictions(&[1], &[0], 2);
        cm.save_csv(&path, &names(2)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "actual\\predicted,class_0,class_1");
        assert_eq!(lines[1], "class_0,0,1");
    }

    #[test]
    fn test_trackers() {
        let mut acc = AccuracyTracker::new();
        acc.add(3, 4);
        acc.add(1, 4);
        assert!((acc.accuracy() - 0.5).abs() < 1e-12);

        let mut avg = RunningAverage::new();
        avg.add(1.0);
        avg.add(3.0);
        assert_eq!(avg.average(), 2.0);
        assert_eq!(AccuracyTracker::new().accuracy(), 0.0);
    }
}
