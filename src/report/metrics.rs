//! Classification metrics over probability predictions.

use serde::{Deserialize, Serialize};

use crate::domain::Label;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_count: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_count
    }
}

/// Precision, recall and F1 for one class treated as the positive one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Rows whose true label is this class.
    pub support: usize,
}

impl ClassReport {
    fn from_counts(hits: usize, false_alarms: usize, misses: usize) -> Self {
        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(hits, hits + false_alarms);
        let recall = ratio(hits, hits + misses);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: hits + misses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassBreakdown {
    pub attrition: ClassReport,
    pub retained: ClassReport,
}

impl ClassBreakdown {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        Self {
            attrition: ClassReport::from_counts(cm.tp, cm.fp, cm.fn_count),
            retained: ClassReport::from_counts(cm.tn, cm.fn_count, cm.fp),
        }
    }
}

/// Headline numbers treat attrition as the positive class; `by_class` adds
/// the same figures for both classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Area under the ROC curve; 0.5 when only one class is present.
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
    pub by_class: ClassBreakdown,
}

impl ClassificationMetrics {
    /// Metrics for `probabilities` thresholded at `decision` (inclusive).
    pub fn compute(probabilities: &[f64], labels: &[Label], decision: f64) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&p, &label) in probabilities.iter().zip(labels.iter()) {
            match (p >= decision, label == 1) {
                (true, true) => cm.tp += 1,
                (true, false) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fn_count += 1,
            }
        }

        let total = cm.total();
        let accuracy = if total > 0 {
            (cm.tp + cm.tn) as f64 / total as f64
        } else {
            0.0
        };
        let by_class = ClassBreakdown::from_confusion(&cm);

        Self {
            accuracy,
            precision: by_class.attrition.precision,
            recall: by_class.attrition.recall,
            f1: by_class.attrition.f1,
            roc_auc: roc_auc(probabilities, labels),
            confusion: cm,
            by_class,
        }
    }
}

/// Rank-sum (Mann-Whitney) AUC. Tied scores share their average rank.
pub fn roc_auc(probabilities: &[f64], labels: &[Label]) -> f64 {
    let n = probabilities.len().min(labels.len());
    let positives = labels[..n].iter().filter(|&&l| l == 1).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        probabilities[a]
            .partial_cmp(&probabilities[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && probabilities[order[end]] == probabilities[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie group spans start+1..=end.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            if labels[i] == 1 {
                positive_rank_sum += avg_rank;
            }
        }
        start = end;
    }

    let p = positives as f64;
    (positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}
